//! Great-circle geometry on WGS84 degree coordinates
//!
//! Pure functions on the hot path of every position update and nearest-location
//! search. Nothing here allocates.

use crate::domain::types::Coordinate;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters
#[inline]
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial great-circle bearing from `a` to `b` in degrees, normalized to [0, 360)
pub fn bearing(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Eight-way compass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompassPoint {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl CompassPoint {
    const ALL: [CompassPoint; 8] = [
        CompassPoint::North,
        CompassPoint::NorthEast,
        CompassPoint::East,
        CompassPoint::SouthEast,
        CompassPoint::South,
        CompassPoint::SouthWest,
        CompassPoint::West,
        CompassPoint::NorthWest,
    ];

    /// Classify a bearing in degrees into 45° sectors centred on each point
    pub fn from_bearing(degrees: f64) -> Self {
        let sector = ((degrees.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
        Self::ALL[sector]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompassPoint::North => "north",
            CompassPoint::NorthEast => "north-east",
            CompassPoint::East => "east",
            CompassPoint::SouthEast => "south-east",
            CompassPoint::South => "south",
            CompassPoint::SouthWest => "south-west",
            CompassPoint::West => "west",
            CompassPoint::NorthWest => "north-west",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_distance_identical_is_zero() {
        let p = Coordinate::new(39.9042, 116.4074);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let pairs = [
            (Coordinate::new(0.0, 0.0), Coordinate::new(0.0009, 0.0)),
            (Coordinate::new(39.9042, 116.4074), Coordinate::new(39.9052, 116.4084)),
            (Coordinate::new(-33.8688, 151.2093), Coordinate::new(51.5074, -0.1278)),
            (Coordinate::new(89.9, 179.9), Coordinate::new(-89.9, -179.9)),
        ];
        for (a, b) in pairs {
            assert!((distance(a, b) - distance(b, a)).abs() < EPS, "{a} vs {b}");
        }
    }

    #[test]
    fn test_distance_about_100m() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0009, 0.0);
        let d = distance(a, b);
        assert!((d - 100.0).abs() <= 2.0, "got {d}");
    }

    #[test]
    fn test_distance_one_degree_longitude_at_equator() {
        let d = distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0));
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_bearing_cardinals() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!((bearing(origin, Coordinate::new(1.0, 0.0)) - 0.0).abs() < EPS);
        assert!((bearing(origin, Coordinate::new(0.0, 1.0)) - 90.0).abs() < EPS);
        assert!((bearing(origin, Coordinate::new(-1.0, 0.0)) - 180.0).abs() < EPS);
        assert!((bearing(origin, Coordinate::new(0.0, -1.0)) - 270.0).abs() < EPS);
    }

    #[test]
    fn test_compass_point_sectors() {
        assert_eq!(CompassPoint::from_bearing(0.0), CompassPoint::North);
        assert_eq!(CompassPoint::from_bearing(359.0), CompassPoint::North);
        assert_eq!(CompassPoint::from_bearing(22.4), CompassPoint::North);
        assert_eq!(CompassPoint::from_bearing(22.6), CompassPoint::NorthEast);
        assert_eq!(CompassPoint::from_bearing(90.0), CompassPoint::East);
        assert_eq!(CompassPoint::from_bearing(225.0), CompassPoint::SouthWest);
        assert_eq!(CompassPoint::from_bearing(-90.0), CompassPoint::West);
    }
}
