//! Location and route store
//!
//! The navigator only sees the `CampusStore` trait. Two backends:
//! - `MemoryStore` - in-process dataset and history (tests, embedding)
//! - `FileStore` - campus dataset loaded from JSON, history appended to JSONL

use crate::domain::trip::HistoryEntry;
use crate::domain::types::{Coordinate, Location, LocationId, Route, RouteId, Waypoint};
use crate::io::history::HistoryLog;
use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::info;

/// Collaborator contract for campus data and trip history
pub trait CampusStore: Send + Sync {
    /// All locations, or only those in `category`
    fn list_locations(&self, category: Option<&str>) -> anyhow::Result<Vec<Location>>;

    fn location(&self, id: LocationId) -> anyhow::Result<Option<Location>>;

    /// Preferred route for the pair, see [`compare_routes`]
    fn get_route(&self, start: LocationId, end: LocationId) -> anyhow::Result<Option<Route>>;

    fn record_history(&self, entry: &HistoryEntry) -> anyhow::Result<()>;

    /// Up to `limit` entries, most recent first
    fn recent_history(&self, limit: usize) -> anyhow::Result<Vec<HistoryEntry>>;
}

/// Route preference: accessible routes first, then shorter distance.
///
/// Equal routes compare `Equal`, so a stable selection keeps store order.
pub fn compare_routes(a: &Route, b: &Route) -> Ordering {
    b.accessible.cmp(&a.accessible).then_with(|| a.distance_m.total_cmp(&b.distance_m))
}

/// Pick the preferred route between `start` and `end`
pub fn select_route<'a, I>(routes: I, start: LocationId, end: LocationId) -> Option<&'a Route>
where
    I: IntoIterator<Item = &'a Route>,
{
    routes
        .into_iter()
        .filter(|r| r.start == start && r.end == end)
        .min_by(|a, b| compare_routes(a, b))
}

/// Campus dataset: locations and the routes between them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Campus {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(skip)]
    by_id: FxHashMap<LocationId, usize>,
}

impl Campus {
    pub fn new(locations: Vec<Location>, routes: Vec<Route>) -> Self {
        let mut campus = Self { locations, routes, by_id: FxHashMap::default() };
        campus.reindex();
        campus
    }

    fn reindex(&mut self) {
        self.by_id = self.locations.iter().enumerate().map(|(i, l)| (l.id, i)).collect();
    }

    /// Load a dataset from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read campus file {}", path.display()))?;
        let mut campus: Campus = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse campus file {}", path.display()))?;
        campus.reindex();

        info!(
            file = %path.display(),
            locations = %campus.locations.len(),
            routes = %campus.routes.len(),
            "campus_loaded"
        );
        Ok(campus)
    }

    /// Write the dataset as pretty JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn add_location(&mut self, location: Location) {
        self.by_id.insert(location.id, self.locations.len());
        self.locations.push(location);
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Sorted by (category, name), or by name when filtered
    pub fn list(&self, category: Option<&str>) -> Vec<Location> {
        let mut out: Vec<Location> = match category {
            Some(c) => self.locations.iter().filter(|l| l.category == c).cloned().collect(),
            None => self.locations.clone(),
        };
        if category.is_some() {
            out.sort_by(|a, b| a.name.cmp(&b.name));
        } else {
            out.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
        }
        out
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.by_id.get(&id).and_then(|&i| self.locations.get(i))
    }

    pub fn route(&self, start: LocationId, end: LocationId) -> Option<&Route> {
        select_route(&self.routes, start, end)
    }

    /// Built-in demo campus: five places and a walk from the Main Building to the Library
    pub fn sample() -> Self {
        let locations = vec![
            Location::new(1, "Main Building", "Teaching", Coordinate::new(39.9042, 116.4074))
                .with_description("Main teaching building")
                .with_features("elevator,tactile paving,accessible restroom"),
            Location::new(2, "Library", "Study", Coordinate::new(39.9052, 116.4084))
                .with_description("Book lending and study rooms")
                .with_features("elevator,tactile paving,accessible restroom,audio guide"),
            Location::new(3, "First Canteen", "Dining", Coordinate::new(39.9032, 116.4064))
                .with_description("Student canteen")
                .with_features("tactile paving,accessible tables,audio menu"),
            Location::new(4, "Dormitory A", "Housing", Coordinate::new(39.9062, 116.4094))
                .with_description("Student housing")
                .with_features("elevator,tactile paving,accessible facilities"),
            Location::new(5, "Gymnasium", "Sports", Coordinate::new(39.9022, 116.4054))
                .with_description("Sports and exercise")
                .with_features("tactile paving,accessible changing room"),
        ];

        let routes = vec![Route {
            id: RouteId(1),
            name: "Main Building to Library".to_string(),
            start: LocationId(1),
            end: LocationId(2),
            waypoints: vec![
                Waypoint::new(39.9042, 116.4074, "Leave the Main Building"),
                Waypoint::new(39.9047, 116.4079, "Walk straight north for 100 meters"),
                Waypoint::new(39.9052, 116.4084, "Arrive at the Library"),
            ],
            distance_m: 150.0,
            estimated_secs: 120,
            accessible: true,
        }];

        Self::new(locations, routes)
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    campus: RwLock<Campus>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl MemoryStore {
    pub fn new(campus: Campus) -> Self {
        Self { campus: RwLock::new(campus), history: Mutex::new(Vec::new()) }
    }

    pub fn add_location(&self, location: Location) {
        self.campus.write().add_location(location);
    }

    pub fn add_route(&self, route: Route) {
        self.campus.write().add_route(route);
    }

    /// All recorded entries in insertion order
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().clone()
    }
}

impl CampusStore for MemoryStore {
    fn list_locations(&self, category: Option<&str>) -> anyhow::Result<Vec<Location>> {
        Ok(self.campus.read().list(category))
    }

    fn location(&self, id: LocationId) -> anyhow::Result<Option<Location>> {
        Ok(self.campus.read().location(id).cloned())
    }

    fn get_route(&self, start: LocationId, end: LocationId) -> anyhow::Result<Option<Route>> {
        Ok(self.campus.read().route(start, end).cloned())
    }

    fn record_history(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        self.history.lock().push(entry.clone());
        Ok(())
    }

    fn recent_history(&self, limit: usize) -> anyhow::Result<Vec<HistoryEntry>> {
        Ok(self.history.lock().iter().rev().take(limit).cloned().collect())
    }
}

/// Dataset file plus JSONL history
pub struct FileStore {
    campus: Campus,
    history: HistoryLog,
}

impl FileStore {
    pub fn open(campus_file: &str, history_file: &str) -> anyhow::Result<Self> {
        let campus = Campus::load(campus_file)?;
        Ok(Self { campus, history: HistoryLog::new(history_file) })
    }
}

impl CampusStore for FileStore {
    fn list_locations(&self, category: Option<&str>) -> anyhow::Result<Vec<Location>> {
        Ok(self.campus.list(category))
    }

    fn location(&self, id: LocationId) -> anyhow::Result<Option<Location>> {
        Ok(self.campus.location(id).cloned())
    }

    fn get_route(&self, start: LocationId, end: LocationId) -> anyhow::Result<Option<Route>> {
        Ok(self.campus.route(start, end).cloned())
    }

    fn record_history(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        self.history.append(entry)
    }

    fn recent_history(&self, limit: usize) -> anyhow::Result<Vec<HistoryEntry>> {
        self.history.recent(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trip::TripStatus;
    use tempfile::tempdir;

    fn route(id: i64, distance_m: f64, accessible: bool) -> Route {
        Route {
            id: RouteId(id),
            name: format!("route-{id}"),
            start: LocationId(1),
            end: LocationId(2),
            waypoints: vec![Waypoint::new(0.0, 0.0, "go")],
            distance_m,
            estimated_secs: 60,
            accessible,
        }
    }

    #[test]
    fn test_accessible_beats_shorter() {
        let routes = [route(1, 100.0, false), route(2, 300.0, true)];
        let chosen = select_route(&routes, LocationId(1), LocationId(2)).unwrap();
        assert_eq!(chosen.id, RouteId(2));
    }

    #[test]
    fn test_shorter_wins_among_accessible() {
        let routes = [route(1, 300.0, true), route(2, 120.0, true), route(3, 50.0, false)];
        let chosen = select_route(&routes, LocationId(1), LocationId(2)).unwrap();
        assert_eq!(chosen.id, RouteId(2));
    }

    #[test]
    fn test_equal_routes_keep_store_order() {
        let routes = [route(7, 100.0, true), route(8, 100.0, true)];
        let chosen = select_route(&routes, LocationId(1), LocationId(2)).unwrap();
        assert_eq!(chosen.id, RouteId(7));
    }

    #[test]
    fn test_route_direction_matters() {
        let routes = [route(1, 100.0, true)];
        assert!(select_route(&routes, LocationId(2), LocationId(1)).is_none());
    }

    #[test]
    fn test_list_ordering() {
        let campus = Campus::sample();
        let all = campus.list(None);
        let categories: Vec<&str> = all.iter().map(|l| l.category.as_str()).collect();
        assert_eq!(categories, vec!["Dining", "Housing", "Sports", "Study", "Teaching"]);

        let study = campus.list(Some("Study"));
        assert_eq!(study.len(), 1);
        assert_eq!(study[0].name, "Library");
        assert!(campus.list(Some("Nope")).is_empty());
    }

    #[test]
    fn test_location_lookup() {
        let campus = Campus::sample();
        assert_eq!(campus.location(LocationId(2)).unwrap().name, "Library");
        assert!(campus.location(LocationId(99)).is_none());
    }

    #[test]
    fn test_memory_store_picks_added_accessible_route() {
        let store = MemoryStore::new(Campus::sample());
        let mut detour = route(10, 90.0, false);
        detour.name = "Shortcut over the lawn".to_string();
        store.add_route(detour);
        let mut ramp = route(11, 140.0, true);
        ramp.name = "Ramp along the canteen".to_string();
        store.add_route(ramp);

        // The sample's accessible 150 m route loses to the shorter accessible ramp
        let chosen = store.get_route(LocationId(1), LocationId(2)).unwrap().unwrap();
        assert_eq!(chosen.name, "Ramp along the canteen");
    }

    #[test]
    fn test_memory_store_added_location_is_listed() {
        let store = MemoryStore::new(Campus::sample());
        store.add_location(
            Location::new(6, "Art Studio", "Teaching", Coordinate::new(39.9045, 116.4060))
                .with_features("ramp"),
        );

        assert_eq!(store.location(LocationId(6)).unwrap().unwrap().name, "Art Studio");
        let teaching = store.list_locations(Some("Teaching")).unwrap();
        let names: Vec<&str> = teaching.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Art Studio", "Main Building"]);
    }

    #[test]
    fn test_memory_store_history() {
        let store = MemoryStore::new(Campus::sample());
        for name in ["Library", "Gymnasium"] {
            store
                .record_history(&HistoryEntry::new("Current position", name, "r", TripStatus::Completed))
                .unwrap();
        }
        let recent = store.recent_history(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].end_label, "Gymnasium");
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let campus_path = dir.path().join("campus.json");
        let history_path = dir.path().join("history.jsonl");
        Campus::sample().save(&campus_path).unwrap();

        let store =
            FileStore::open(campus_path.to_str().unwrap(), history_path.to_str().unwrap()).unwrap();
        assert_eq!(store.list_locations(None).unwrap().len(), 5);
        assert_eq!(store.location(LocationId(4)).unwrap().unwrap().name, "Dormitory A");

        let route = store.get_route(LocationId(1), LocationId(2)).unwrap().unwrap();
        assert_eq!(route.waypoints.len(), 3);

        store
            .record_history(&HistoryEntry::new("Current position", "Library", &route.name, TripStatus::Completed))
            .unwrap();
        assert_eq!(store.recent_history(10).unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_missing_dataset() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let result = FileStore::open(missing.to_str().unwrap(), "unused.jsonl");
        assert!(result.is_err());
    }
}
