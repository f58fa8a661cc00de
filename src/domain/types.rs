//! Shared types for campus wayfinding

use serde::{Deserialize, Serialize};

/// Newtype wrapper for location IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub i64);

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for route IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub i64);

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "lng", alias = "longitude")]
    pub lon: f64,
}

impl Coordinate {
    #[inline]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// A named place on campus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub category: String,
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(default)]
    pub description: String,
    /// Comma-separated list, e.g. "elevator,tactile paving"
    #[serde(default)]
    pub accessible_features: String,
}

impl Location {
    pub fn new(id: i64, name: &str, category: &str, coordinate: Coordinate) -> Self {
        Self {
            id: LocationId(id),
            name: name.to_string(),
            category: category.to_string(),
            coordinate,
            description: String::new(),
            accessible_features: String::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_features(mut self, features: &str) -> Self {
        self.accessible_features = features.to_string();
        self
    }
}

/// A point along a route carrying a spoken instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(default)]
    pub instruction: String,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64, instruction: &str) -> Self {
        Self { coordinate: Coordinate::new(lat, lon), instruction: instruction.to_string() }
    }
}

/// Stored route between two locations. Immutable once retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub start: LocationId,
    pub end: LocationId,
    pub waypoints: Vec<Waypoint>,
    /// Total length in meters
    pub distance_m: f64,
    /// Estimated walking time in seconds
    pub estimated_secs: u32,
    #[serde(default = "default_accessible")]
    pub accessible: bool,
}

fn default_accessible() -> bool {
    true
}

impl Route {
    #[inline]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// A single position fix from the positioning source or the simulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    /// Accuracy radius in meters
    pub accuracy_m: f64,
    /// Capture time, epoch ms
    pub captured_at_ms: u64,
}

impl PositionSample {
    pub fn new(coordinate: Coordinate, accuracy_m: f64, captured_at_ms: u64) -> Self {
        Self { coordinate, accuracy_m, captured_at_ms }
    }

    /// Age of the sample relative to `now_ms`. Samples from the future count as fresh.
    #[inline]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.captured_at_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_json_shape() {
        let json = r#"{
            "id": 2,
            "name": "Library",
            "category": "Study",
            "lat": 39.9052,
            "lon": 116.4084,
            "accessible_features": "elevator"
        }"#;
        let location: Location = serde_json::from_str(json).unwrap();
        assert_eq!(location.id, LocationId(2));
        assert_eq!(location.coordinate, Coordinate::new(39.9052, 116.4084));
        assert!(location.description.is_empty());
    }

    #[test]
    fn test_waypoint_accepts_lng_alias() {
        let waypoint: Waypoint =
            serde_json::from_str(r#"{"lat": 1.0, "lng": 2.0, "instruction": "Go"}"#).unwrap();
        assert_eq!(waypoint.coordinate.lon, 2.0);
        assert_eq!(waypoint.instruction, "Go");
    }

    #[test]
    fn test_sample_age_saturates() {
        let sample = PositionSample::new(Coordinate::new(0.0, 0.0), 5.0, 10_000);
        assert_eq!(sample.age_ms(12_500), 2_500);
        assert_eq!(sample.age_ms(9_000), 0);
    }
}
