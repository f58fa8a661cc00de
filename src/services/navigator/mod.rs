//! Navigation session state machine
//!
//! The Navigator owns "am I navigating, to where, and what should I say next":
//! - Destination selection and route acquisition
//! - Session lifecycle (Idle -> Navigating -> Arrived/Stopped)
//! - Feeding position ticks (live or synthetic) to the route player
//! - Turning player events into announcements and history records
//!
//! All mutable session state sits behind one mutex. Ticks, `start` and `stop`
//! mutate it; `status` reads a consistent snapshot. Store lookups happen before
//! the lock is taken, and announcements/history are dispatched after it is
//! released, so a tick holds the lock for one geometry computation.

mod handlers;

use crate::domain::trip::{epoch_ms, HistoryEntry};
use crate::domain::types::{Location, PositionSample};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::announcer::{Announcement, Announcer, SoundCue};
use crate::io::positioning::PositionSource;
use crate::io::store::CampusStore;
use crate::services::driver::{DriverHandle, DriverKind};
use crate::services::route_player::RoutePlayer;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};

/// Identifies one navigation session; increments on every successful start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingDestination,
    Navigating,
    Arrived,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingDestination => "awaiting_destination",
            SessionState::Navigating => "navigating",
            SessionState::Arrived => "arrived",
            SessionState::Stopped => "stopped",
        }
    }
}

/// Failures surfaced to the caller and spoken to the user. None of them is fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationError {
    /// The store has no locations to resolve a start from
    NoLocationsKnown,
    /// No position has ever been reported (recovered with the fallback position)
    NoCurrentPosition,
    /// No route from the resolved start to the destination
    RouteNotFound { destination: String },
    /// A tick driver could not be started
    DriverAttachFailure(String),
    /// The store could not be read or written
    Store(String),
}

impl std::fmt::Display for NavigationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationError::NoLocationsKnown => write!(f, "no locations available"),
            NavigationError::NoCurrentPosition => write!(f, "current position unknown"),
            NavigationError::RouteNotFound { destination } => {
                write!(f, "no route found to {destination}")
            }
            NavigationError::DriverAttachFailure(reason) => {
                write!(f, "position updates unavailable: {reason}")
            }
            NavigationError::Store(reason) => write!(f, "campus data unavailable: {reason}"),
        }
    }
}

impl std::error::Error for NavigationError {}

/// Read-only snapshot of the session
#[derive(Debug, Clone, Serialize)]
pub struct NavigationStatus {
    pub state: SessionState,
    pub is_navigating: bool,
    pub session: SessionId,
    pub destination_name: Option<String>,
    pub route_name: Option<String>,
    pub current_instruction_index: usize,
    pub total_instructions: usize,
    pub current_position: Option<PositionSample>,
    pub driver: Option<DriverKind>,
}

/// The route being (or last) navigated
pub(crate) struct Trip {
    pub(crate) start: Location,
    pub(crate) destination: Location,
    pub(crate) player: RoutePlayer,
    /// Waypoint index of the last spoken instruction
    pub(crate) last_announced: Option<usize>,
}

pub(crate) struct SessionInner {
    pub(crate) state: SessionState,
    pub(crate) session: SessionId,
    /// Kept after arrival/stop so status still reports the last trip
    pub(crate) trip: Option<Trip>,
    pub(crate) driver: Option<DriverHandle>,
    pub(crate) position: Option<PositionSample>,
}

/// Side effects computed under the lock and applied after it is released
pub(crate) enum Effect {
    Announce(Announcement),
    RecordHistory(HistoryEntry),
    Detach(DriverHandle),
}

/// Navigation engine, one session at a time
pub struct Navigator {
    pub(crate) inner: Mutex<SessionInner>,
    pub(crate) store: Arc<dyn CampusStore>,
    pub(crate) announcer: Arc<dyn Announcer>,
    pub(crate) live_source: Option<Arc<dyn PositionSource>>,
    pub(crate) config: Config,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) self_ref: Weak<Navigator>,
}

impl Navigator {
    /// Create a navigator. Without a `live_source` every session uses the synthetic driver.
    pub fn new(
        config: Config,
        store: Arc<dyn CampusStore>,
        announcer: Arc<dyn Announcer>,
        live_source: Option<Arc<dyn PositionSource>>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                session: SessionId(0),
                trip: None,
                driver: None,
                position: None,
            }),
            store,
            announcer,
            live_source,
            config,
            metrics,
            self_ref: self_ref.clone(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn current_position(&self) -> Option<PositionSample> {
        self.inner.lock().position
    }

    /// Consistent snapshot of the session
    pub fn status(&self) -> NavigationStatus {
        let inner = self.inner.lock();
        let trip = inner.trip.as_ref();
        NavigationStatus {
            state: inner.state,
            is_navigating: inner.state == SessionState::Navigating,
            session: inner.session,
            destination_name: trip.map(|t| t.destination.name.clone()),
            route_name: trip.map(|t| t.player.route().name.clone()),
            current_instruction_index: trip.map(|t| t.player.current_index()).unwrap_or(0),
            total_instructions: trip.map(|t| t.player.total()).unwrap_or(0),
            current_position: inner.position,
            driver: inner.driver.as_ref().map(|d| d.kind()),
        }
    }

    /// Remember the latest fix without feeding any session
    pub fn record_position(&self, sample: PositionSample) {
        self.inner.lock().position = Some(sample);
    }

    /// Most recent completed trips, newest first
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>, NavigationError> {
        self.store.recent_history(limit).map_err(|e| {
            self.metrics.record_store_failure();
            NavigationError::Store(format!("{e:#}"))
        })
    }

    pub(crate) fn current_session(&self) -> SessionId {
        self.inner.lock().session
    }

    /// Dispatch effects outside the session lock
    pub(crate) fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Announce(announcement) => announcement.deliver(self.announcer.as_ref()),
                Effect::RecordHistory(entry) => {
                    if let Err(e) = self.store.record_history(&entry) {
                        self.metrics.record_store_failure();
                        tracing::error!(error = %format!("{e:#}"), id = %entry.id, "history_record_failed");
                    }
                }
                Effect::Detach(handle) => handle.detach(),
            }
        }
    }

    /// Speak an error with the error cue. The speech interrupts, so it goes first.
    pub(crate) fn announce_error(&self, error: &NavigationError) {
        self.apply(vec![
            Effect::Announce(Announcement::urgent(format!("Error: {error}"))),
            Effect::Announce(Announcement::Sound(SoundCue::Error)),
        ]);
    }

    pub(crate) fn now_ms(&self) -> u64 {
        epoch_ms()
    }
}
