//! Services - navigation logic and session state
//!
//! This module contains the core navigation services:
//! - `navigator` - Session state machine, the single owner of navigation state
//! - `route_player` - Waypoint playback (live and synthetic stepping)
//! - `location_index` - Nearest/within-radius lookups over known locations
//! - `driver` - Live and synthetic tick drivers feeding a session

pub mod driver;
pub mod location_index;
pub mod navigator;
pub mod route_player;

// Re-export commonly used types
pub use driver::{DriverKind, LiveDriver, SyntheticDriver, TickDriver};
pub use navigator::{NavigationError, NavigationStatus, Navigator, SessionId, SessionState};
pub use route_player::{PlayerEvent, Radii, RoutePlayer};
