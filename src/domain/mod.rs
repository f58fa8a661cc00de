//! Domain models - campus data, geometry and trip history
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - `Coordinate`, `Location`, `Waypoint`, `Route`, `PositionSample`
//! - `geometry` - great-circle distance and bearing
//! - `trip` - completed-trip `HistoryEntry`

pub mod geometry;
pub mod trip;
pub mod types;

pub use types::{Coordinate, Location, LocationId, PositionSample, Route, RouteId, Waypoint};
