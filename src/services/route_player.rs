//! Route player - decides which waypoint is current and when to speak
//!
//! Two deliberately different stepping modes:
//! - `step_live` is closed-loop: driven by a measured position and the
//!   instruction/arrival radii.
//! - `step_synthetic` is open-loop: plays one waypoint per call regardless of
//!   distance, moving a synthetic position along the route.

use crate::domain::geometry::distance;
use crate::domain::types::{Coordinate, Route};
use smallvec::SmallVec;
use std::sync::Arc;

/// Events produced by one player step (at most an instruction and an arrival)
pub type PlayerEvents = SmallVec<[PlayerEvent; 2]>;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Instruction for waypoint `index`, `distance_m` away
    Instruction { index: usize, text: String, distance_m: f64 },
    /// Final waypoint reached
    Arrived,
}

/// Distance thresholds for the live mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Radii {
    pub instruction_m: f64,
    pub arrival_m: f64,
}

impl Default for Radii {
    fn default() -> Self {
        Self { instruction_m: 20.0, arrival_m: 5.0 }
    }
}

/// Playback state over one immutable route
#[derive(Debug, Clone)]
pub struct RoutePlayer {
    route: Arc<Route>,
    current_index: usize,
    radii: Radii,
    /// Where the synthetic mode believes the user is
    synthetic_position: Option<Coordinate>,
}

impl RoutePlayer {
    pub fn new(route: Arc<Route>, radii: Radii) -> Self {
        Self { route, current_index: 0, radii, synthetic_position: None }
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn total(&self) -> usize {
        self.route.waypoints.len()
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.total()
    }

    /// Seed the synthetic position (the user's position when playback starts)
    pub fn set_synthetic_position(&mut self, position: Coordinate) {
        self.synthetic_position = Some(position);
    }

    pub fn synthetic_position(&self) -> Option<Coordinate> {
        self.synthetic_position
    }

    /// One closed-loop tick at `position`.
    ///
    /// Inside the instruction radius the current waypoint's instruction is emitted
    /// on every tick; inside the arrival radius the index also advances, and
    /// passing the last waypoint emits `Arrived`.
    pub fn step_live(&mut self, position: Coordinate) -> PlayerEvents {
        let mut events = PlayerEvents::new();
        let Some(waypoint) = self.route.waypoints.get(self.current_index) else {
            return events;
        };

        let d = distance(position, waypoint.coordinate);
        if d > self.radii.instruction_m {
            return events;
        }

        events.push(PlayerEvent::Instruction {
            index: self.current_index,
            text: waypoint.instruction.clone(),
            distance_m: d,
        });

        if d <= self.radii.arrival_m {
            self.current_index += 1;
            if self.is_finished() {
                events.push(PlayerEvent::Arrived);
            }
        }

        events
    }

    /// One open-loop step: announce the current waypoint, jump onto it, advance.
    pub fn step_synthetic(&mut self) -> PlayerEvents {
        let mut events = PlayerEvents::new();
        let Some(waypoint) = self.route.waypoints.get(self.current_index) else {
            return events;
        };

        let from = self.synthetic_position.unwrap_or(waypoint.coordinate);
        events.push(PlayerEvent::Instruction {
            index: self.current_index,
            text: waypoint.instruction.clone(),
            distance_m: distance(from, waypoint.coordinate),
        });

        self.synthetic_position = Some(waypoint.coordinate);
        self.current_index += 1;
        if self.is_finished() {
            events.push(PlayerEvent::Arrived);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{LocationId, RouteId, Waypoint};

    fn three_point_route() -> Arc<Route> {
        Arc::new(Route {
            id: RouteId(1),
            name: "test".to_string(),
            start: LocationId(1),
            end: LocationId(2),
            waypoints: vec![
                Waypoint::new(0.0, 0.0, "Start"),
                Waypoint::new(0.001, 0.0, "Go north"),
                Waypoint::new(0.002, 0.0, "Arrive"),
            ],
            distance_m: 222.0,
            estimated_secs: 180,
            accessible: true,
        })
    }

    fn instruction_count(events: &PlayerEvents) -> usize {
        events.iter().filter(|e| matches!(e, PlayerEvent::Instruction { .. })).count()
    }

    #[test]
    fn test_far_away_is_silent() {
        let mut player = RoutePlayer::new(three_point_route(), Radii::default());
        let events = player.step_live(Coordinate::new(0.01, 0.0));
        assert!(events.is_empty());
        assert_eq!(player.current_index(), 0);
    }

    #[test]
    fn test_instruction_radius_without_advance() {
        let mut player = RoutePlayer::new(three_point_route(), Radii::default());
        // ~11 m north of waypoint 0
        let events = player.step_live(Coordinate::new(0.0001, 0.0));
        assert_eq!(instruction_count(&events), 1);
        assert_eq!(player.current_index(), 0);

        // Lingering repeats the instruction
        let again = player.step_live(Coordinate::new(0.0001, 0.0));
        assert_eq!(instruction_count(&again), 1);
        assert_eq!(player.current_index(), 0);
    }

    #[test]
    fn test_live_walk_arrives_after_last() {
        let mut player = RoutePlayer::new(three_point_route(), Radii::default());
        let mut instructions = 0;
        let mut arrived = false;

        for lat in [0.0, 0.001, 0.002] {
            let events = player.step_live(Coordinate::new(lat, 0.00001));
            instructions += instruction_count(&events);
            arrived |= events.contains(&PlayerEvent::Arrived);
        }

        assert_eq!(instructions, 3);
        assert!(arrived);
        assert!(player.is_finished());
    }

    #[test]
    fn test_exhausted_route_is_noop() {
        let mut player = RoutePlayer::new(three_point_route(), Radii::default());
        for _ in 0..3 {
            player.step_synthetic();
        }
        assert!(player.step_live(Coordinate::new(0.002, 0.0)).is_empty());
        assert!(player.step_synthetic().is_empty());
    }

    #[test]
    fn test_synthetic_ignores_distance() {
        let mut player = RoutePlayer::new(three_point_route(), Radii::default());
        player.set_synthetic_position(Coordinate::new(10.0, 10.0));

        let first = player.step_synthetic();
        assert!(matches!(first[0], PlayerEvent::Instruction { index: 0, distance_m, .. } if distance_m > 1000.0));
        assert_eq!(player.synthetic_position(), Some(Coordinate::new(0.0, 0.0)));

        let second = player.step_synthetic();
        assert!(matches!(second[0], PlayerEvent::Instruction { index: 1, distance_m, .. } if (distance_m - 111.2).abs() < 1.0));

        let third = player.step_synthetic();
        assert_eq!(instruction_count(&third), 1);
        assert_eq!(third.last(), Some(&PlayerEvent::Arrived));
    }

    #[test]
    fn test_empty_route_never_arrives() {
        let route = Arc::new(Route { waypoints: Vec::new(), ..(*three_point_route()).clone() });
        let mut player = RoutePlayer::new(route, Radii::default());
        assert!(player.is_finished());
        assert!(player.step_live(Coordinate::new(0.0, 0.0)).is_empty());
    }
}
