//! Operations and tick handlers for the Navigator
//!
//! Each public operation computes its side effects while holding the session
//! lock and hands them to `apply` once the lock is released.

use super::{Effect, NavigationError, Navigator, SessionId, SessionInner, SessionState, Trip};
use crate::domain::geometry::{bearing, CompassPoint};
use crate::domain::trip::{HistoryEntry, TripStatus};
use crate::domain::types::{Location, PositionSample, Route};
use crate::io::announcer::{instruction_text, Announcement, SoundCue};
use crate::services::driver::{
    DriverHandle, DriverKind, LiveDriver, SyntheticDriver, TickDriver, TickTarget,
};
use crate::services::location_index::{group_by_category, nearest, within_radius};
use crate::services::route_player::{PlayerEvent, PlayerEvents, Radii, RoutePlayer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

impl Navigator {
    /// Start navigating to `destination`
    ///
    /// Resolves the start as the known location nearest to the current position
    /// (or the configured fallback position), fetches the preferred route and
    /// attaches a tick driver. A running session is replaced without announcement.
    /// On failure the error is announced and the session is left as it was.
    pub fn start(&self, destination: &Location) -> Result<(), NavigationError> {
        let (start, route, position) = match self.prepare_trip(destination) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(destination = %destination.name, error = %e, "navigation_start_failed");
                self.announce_error(&e);
                return Err(e);
            }
        };

        let radii = Radii {
            instruction_m: self.config.instruction_radius_m(),
            arrival_m: self.config.arrival_radius_m(),
        };
        let mut player = RoutePlayer::new(Arc::new(route), radii);
        player.set_synthetic_position(position.coordinate);

        let (session, previous, total) = {
            let mut inner = self.inner.lock();
            let previous = inner.driver.take();
            let session = SessionId(inner.session.0 + 1);
            let total = player.total();
            inner.session = session;
            inner.trip = Some(Trip {
                start: start.clone(),
                destination: destination.clone(),
                player,
                last_announced: None,
            });
            inner.state = SessionState::Navigating;
            (session, previous, total)
        };

        if let Some(previous) = previous {
            info!(session = %session, "previous_session_replaced");
            previous.detach();
        }

        self.metrics.record_session_started();
        info!(
            session = %session,
            start = %start.name,
            destination = %destination.name,
            waypoints = %total,
            "navigation_started"
        );

        self.apply(vec![
            Effect::Announce(Announcement::speech(format!("Navigating to {}", destination.name))),
            Effect::Announce(Announcement::Sound(SoundCue::NavigationStart)),
        ]);

        if let Some(handle) = self.attach_driver(session) {
            let mut inner = self.inner.lock();
            if inner.session == session && inner.state == SessionState::Navigating {
                inner.driver = Some(handle);
            } else {
                // Session ended (or was replaced) before the driver was installed
                drop(inner);
                handle.detach();
            }
        }

        Ok(())
    }

    /// Stop the running session. No-op unless navigating.
    pub fn stop(&self) -> bool {
        let (session, driver) = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Navigating {
                return false;
            }
            inner.state = SessionState::Stopped;
            (inner.session, inner.driver.take())
        };

        self.metrics.record_session_stopped();
        info!(session = %session, "navigation_stopped");

        let mut effects = Vec::with_capacity(2);
        if let Some(driver) = driver {
            effects.push(Effect::Detach(driver));
        }
        effects.push(Effect::Announce(Announcement::speech("Navigation stopped")));
        self.apply(effects);
        true
    }

    /// Position reported by the caller
    ///
    /// The sample always becomes the current position. While navigating (and not
    /// on the synthetic driver) it is also fed to the route player.
    pub fn on_position_update(&self, sample: PositionSample) {
        let started = Instant::now();
        let effects = {
            let mut inner = self.inner.lock();
            inner.position = Some(sample);
            let synthetic = inner.driver.as_ref().map(|d| d.kind()) == Some(DriverKind::Synthetic);
            if inner.state != SessionState::Navigating || synthetic {
                return;
            }
            self.live_tick(&mut inner, sample)
        };
        self.apply(effects);
        self.metrics.record_tick(started.elapsed().as_micros() as u64);
    }

    /// Live tick from a driver attached for `session`. Returns false once the
    /// driver should stop delivering.
    pub(crate) fn deliver_live(&self, session: SessionId, sample: PositionSample) -> bool {
        let started = Instant::now();
        let (effects, keep_going) = {
            let mut inner = self.inner.lock();
            if !Self::accepts_tick(&inner, session) {
                drop(inner);
                self.reject_tick(session);
                return false;
            }
            inner.position = Some(sample);
            let effects = self.live_tick(&mut inner, sample);
            (effects, inner.state == SessionState::Navigating)
        };
        self.apply(effects);
        self.metrics.record_tick(started.elapsed().as_micros() as u64);
        keep_going
    }

    /// Synthetic tick for `session`: play the next waypoint regardless of distance
    pub(crate) fn synthetic_step(&self, session: SessionId) -> bool {
        let started = Instant::now();
        let (effects, keep_going) = {
            let mut inner = self.inner.lock();
            if !Self::accepts_tick(&inner, session) {
                drop(inner);
                self.reject_tick(session);
                return false;
            }
            let Some(trip) = inner.trip.as_mut() else {
                return false;
            };
            let events = trip.player.step_synthetic();
            if let Some(position) = trip.player.synthetic_position() {
                inner.position = Some(PositionSample::new(position, 0.0, self.now_ms()));
            }
            let effects = self.handle_events(&mut inner, events);
            (effects, inner.state == SessionState::Navigating)
        };
        self.apply(effects);
        self.metrics.record_tick(started.elapsed().as_micros() as u64);
        keep_going
    }

    /// Known locations within `radius_m` of the current position, nearest first
    pub fn nearby_locations(&self, radius_m: f64) -> Vec<(Location, f64)> {
        let Some(position) = self.current_position() else {
            return Vec::new();
        };
        let locations = match self.store.list_locations(None) {
            Ok(locations) => locations,
            Err(e) => {
                self.metrics.record_store_failure();
                warn!(error = %format!("{e:#}"), "nearby_lookup_failed");
                return Vec::new();
            }
        };
        within_radius(position.coordinate, radius_m, &locations)
            .into_iter()
            .map(|(location, d)| (location.clone(), d))
            .collect()
    }

    /// Speak the places around the current position
    pub fn announce_nearby(&self, radius_m: f64) -> Vec<(Location, f64)> {
        let found = self.nearby_locations(radius_m);
        let Some(position) = self.current_position() else {
            self.apply(vec![Effect::Announce(Announcement::speech("No places found nearby"))]);
            return found;
        };

        let mut effects = Vec::new();
        if found.is_empty() {
            effects.push(Effect::Announce(Announcement::speech("No places found nearby")));
        } else {
            effects.push(Effect::Announce(Announcement::speech(format!(
                "{} places nearby",
                found.len()
            ))));
            for (location, d) in found.iter().take(self.config.nearby_announce_limit()) {
                let compass = CompassPoint::from_bearing(bearing(position.coordinate, location.coordinate));
                effects.push(Effect::Announce(Announcement::speech(format!(
                    "{}, {:.0} meters {}",
                    location.name,
                    d,
                    compass.as_str()
                ))));
            }
        }
        self.apply(effects);
        found
    }

    /// Offer destinations grouped by category
    ///
    /// Moves to `AwaitingDestination` unless a session is running.
    pub fn begin_destination_selection(
        &self,
    ) -> Result<Vec<(String, Vec<Location>)>, NavigationError> {
        let locations = self.store.list_locations(None).map_err(|e| {
            self.metrics.record_store_failure();
            NavigationError::Store(format!("{e:#}"))
        });
        let locations = match locations {
            Ok(locations) if locations.is_empty() => Err(NavigationError::NoLocationsKnown),
            other => other,
        };
        let locations = match locations {
            Ok(locations) => locations,
            Err(e) => {
                {
                    let mut inner = self.inner.lock();
                    if inner.state != SessionState::Navigating {
                        inner.state = SessionState::Idle;
                    }
                }
                if e == NavigationError::NoLocationsKnown {
                    self.metrics.record_no_locations_known();
                }
                warn!(error = %e, "destination_selection_failed");
                self.announce_error(&e);
                return Err(e);
            }
        };

        let groups = group_by_category(&locations);
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Navigating {
                inner.state = SessionState::AwaitingDestination;
            }
        }

        let categories: Vec<&str> = groups.iter().map(|(c, _)| c.as_str()).collect();
        debug!(categories = %categories.len(), locations = %locations.len(), "destination_selection_started");
        self.apply(vec![
            Effect::Announce(Announcement::speech("Campus navigation ready")),
            Effect::Announce(Announcement::speech("Please choose a destination")),
            Effect::Announce(Announcement::speech(format!(
                "Available categories: {}",
                categories.join(", ")
            ))),
        ]);
        Ok(groups)
    }

    /// Resolve start, route and position for a trip. Reads the store outside the lock.
    fn prepare_trip(
        &self,
        destination: &Location,
    ) -> Result<(Location, Route, PositionSample), NavigationError> {
        let position = match self.current_position() {
            Some(position) => position,
            None => {
                let fallback =
                    PositionSample::new(self.config.fallback_position(), 0.0, self.now_ms());
                warn!(
                    error = %NavigationError::NoCurrentPosition,
                    fallback = %fallback.coordinate,
                    "using_fallback_position"
                );
                self.record_position(fallback);
                fallback
            }
        };

        let locations = self.store.list_locations(None).map_err(|e| {
            self.metrics.record_store_failure();
            NavigationError::Store(format!("{e:#}"))
        })?;

        let Some(start) = nearest(position.coordinate, &locations).cloned() else {
            self.metrics.record_no_locations_known();
            return Err(NavigationError::NoLocationsKnown);
        };

        let route = self.store.get_route(start.id, destination.id).map_err(|e| {
            self.metrics.record_store_failure();
            NavigationError::Store(format!("{e:#}"))
        })?;

        match route {
            Some(route) if !route.is_empty() => Ok((start, route, position)),
            _ => {
                self.metrics.record_route_not_found();
                Err(NavigationError::RouteNotFound { destination: destination.name.clone() })
            }
        }
    }

    /// Live driver if a source is configured, synthetic otherwise or on failure
    fn attach_driver(&self, session: SessionId) -> Option<DriverHandle> {
        let target = TickTarget { navigator: self.self_ref.clone(), session };

        if let Some(source) = &self.live_source {
            match LiveDriver::new(source.clone()).attach(target.clone()) {
                Ok(handle) => return Some(handle),
                Err(e) => {
                    self.metrics.record_driver_fallback();
                    warn!(session = %session, error = %e, "live_driver_unavailable_using_synthetic");
                }
            }
        }

        let synthetic = SyntheticDriver::new(Duration::from_millis(self.config.synthetic_interval_ms()));
        match synthetic.attach(target) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(session = %session, error = %e, "synthetic_driver_attach_failed");
                None
            }
        }
    }

    fn accepts_tick(inner: &SessionInner, session: SessionId) -> bool {
        inner.session == session && inner.state == SessionState::Navigating
    }

    fn reject_tick(&self, session: SessionId) {
        self.metrics.record_late_tick();
        debug!(session = %session, current = %self.current_session(), "late_tick_dropped");
    }

    /// Closed-loop step; stale samples are kept as position but not acted on
    fn live_tick(&self, inner: &mut SessionInner, sample: PositionSample) -> Vec<Effect> {
        let max_age = self.config.max_sample_age_ms();
        if max_age > 0 {
            let age = sample.age_ms(self.now_ms());
            if age > max_age {
                self.metrics.record_stale_sample();
                debug!(session = %inner.session, age_ms = %age, "stale_sample_ignored");
                return Vec::new();
            }
        }

        let Some(trip) = inner.trip.as_mut() else {
            return Vec::new();
        };
        let events = trip.player.step_live(sample.coordinate);
        self.handle_events(inner, events)
    }

    /// Turn player events into announcements and, on arrival, history
    fn handle_events(&self, inner: &mut SessionInner, events: PlayerEvents) -> Vec<Effect> {
        let mut effects = Vec::new();
        for event in events {
            match event {
                PlayerEvent::Instruction { index, text, distance_m } => {
                    let Some(trip) = inner.trip.as_mut() else { continue };
                    if !self.config.repeat_instructions() && trip.last_announced == Some(index) {
                        self.metrics.record_instruction_suppressed();
                        continue;
                    }
                    trip.last_announced = Some(index);
                    self.metrics.record_instruction_announced();
                    debug!(
                        session = %inner.session,
                        index = %index,
                        distance_m = %format!("{distance_m:.1}"),
                        "waypoint_instruction"
                    );
                    effects.push(Effect::Announce(Announcement::guidance(instruction_text(
                        &text, distance_m,
                    ))));
                }
                PlayerEvent::Arrived => effects.extend(self.arrive(inner)),
            }
        }
        effects
    }

    fn arrive(&self, inner: &mut SessionInner) -> Vec<Effect> {
        inner.state = SessionState::Arrived;
        let Some(trip) = inner.trip.as_ref() else {
            return Vec::new();
        };

        self.metrics.record_session_arrived();
        info!(
            session = %inner.session,
            destination = %trip.destination.name,
            route = %trip.player.route().name,
            "navigation_arrived"
        );

        let entry = HistoryEntry::new(
            &trip.start.name,
            &trip.destination.name,
            &trip.player.route().name,
            TripStatus::Completed,
        );
        let mut effects = vec![
            Effect::Announce(Announcement::Sound(SoundCue::NavigationEnd)),
            Effect::Announce(Announcement::speech(format!("Arrived at {}", trip.destination.name))),
            Effect::RecordHistory(entry),
        ];
        if let Some(driver) = inner.driver.take() {
            effects.push(Effect::Detach(driver));
        }
        effects
    }
}
