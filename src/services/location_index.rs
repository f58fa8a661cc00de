//! Nearest-location lookups over a snapshot of known locations
//!
//! Linear scans; campus datasets are small and the snapshot is taken fresh
//! from the store for every query.

use crate::domain::geometry::distance;
use crate::domain::types::{Coordinate, Location};

/// Closest candidate to `point`. Ties go to the first in input order.
pub fn nearest<'a>(point: Coordinate, candidates: &'a [Location]) -> Option<&'a Location> {
    let mut best: Option<(&Location, f64)> = None;
    for location in candidates {
        let d = distance(point, location.coordinate);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((location, d)),
        }
    }
    best.map(|(location, _)| location)
}

/// Candidates within `radius_m` of `point`, nearest first.
///
/// The sort is stable, so equidistant candidates keep input order.
pub fn within_radius<'a>(
    point: Coordinate,
    radius_m: f64,
    candidates: &'a [Location],
) -> Vec<(&'a Location, f64)> {
    let mut found: Vec<(&Location, f64)> = candidates
        .iter()
        .map(|l| (l, distance(point, l.coordinate)))
        .filter(|(_, d)| *d <= radius_m)
        .collect();
    found.sort_by(|a, b| a.1.total_cmp(&b.1));
    found
}

/// Group locations by category, keeping first-seen category order
pub fn group_by_category(locations: &[Location]) -> Vec<(String, Vec<Location>)> {
    let mut groups: Vec<(String, Vec<Location>)> = Vec::new();
    for location in locations {
        match groups.iter_mut().find(|(c, _)| *c == location.category) {
            Some((_, members)) => members.push(location.clone()),
            None => groups.push((location.category.clone(), vec![location.clone()])),
        }
    }
    groups
}
