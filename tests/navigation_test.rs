//! End-to-end navigation over a file-backed campus

use campus_wayfinder::domain::trip::{epoch_ms, TripStatus};
use campus_wayfinder::domain::types::{Coordinate, LocationId, PositionSample};
use campus_wayfinder::infra::{Config, Metrics};
use campus_wayfinder::io::{
    create_speech_queue, Campus, CampusStore, FileStore, PositionFeed, PositionSource, SpeechCmd,
};
use campus_wayfinder::services::{DriverKind, NavigationError, Navigator, SessionState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Setup {
    _dir: TempDir,
    store: Arc<dyn CampusStore>,
    history_file: String,
}

fn file_store() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let campus_file = dir.path().join("campus.json");
    let history_file = dir.path().join("history").join("trips.jsonl");
    Campus::sample().save(&campus_file).unwrap();

    let store = FileStore::open(campus_file.to_str().unwrap(), history_file.to_str().unwrap()).unwrap();
    Setup { _dir: dir, store: Arc::new(store), history_file: history_file.to_str().unwrap().to_string() }
}

async fn wait_for_state(navigator: &Navigator, state: SessionState) {
    for _ in 0..400 {
        if navigator.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("navigator never reached {state:?}, still {:?}", navigator.state());
}

#[tokio::test]
async fn test_synthetic_trip_records_history_file() {
    let setup = file_store();
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let sink = spoken.clone();
    let metrics = Arc::new(Metrics::new());
    let (queue, worker) = create_speech_queue(
        64,
        metrics.clone(),
        Box::new(move |cmd| {
            if let SpeechCmd::Say { text, .. } = cmd {
                sink.lock().push(text.clone());
            }
        }),
    );
    let speech = tokio::spawn(worker.run());

    let config = Config::default().with_synthetic_interval_ms(20);
    let navigator = Navigator::new(config, setup.store.clone(), Arc::new(queue), None, metrics.clone());

    let library = setup.store.location(LocationId(2)).unwrap().unwrap();
    navigator.start(&library).unwrap();
    assert_eq!(navigator.status().driver, Some(DriverKind::Synthetic));

    wait_for_state(&navigator, SessionState::Arrived).await;

    let history = navigator.history(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].start_label, "Main Building");
    assert_eq!(history[0].end_label, "Library");
    assert_eq!(history[0].status, TripStatus::Completed);

    let lines = std::fs::read_to_string(&setup.history_file).unwrap();
    assert_eq!(lines.lines().count(), 1);

    drop(navigator);
    speech.await.unwrap();

    let spoken = spoken.lock();
    assert_eq!(spoken.first().map(String::as_str), Some("Navigating to Library"));
    assert_eq!(spoken.last().map(String::as_str), Some("Arrived at Library"));
    assert_eq!(metrics.instructions_announced(), 3);
}

#[tokio::test]
async fn test_live_trip_over_position_feed() {
    let setup = file_store();
    let feed = PositionFeed::new(16);
    let source: Arc<dyn PositionSource> = Arc::new(feed.clone());
    let metrics = Arc::new(Metrics::new());
    let (queue, worker) = create_speech_queue(64, metrics.clone(), Box::new(|_| {}));
    let speech = tokio::spawn(worker.run());

    let navigator =
        Navigator::new(Config::default(), setup.store.clone(), Arc::new(queue), Some(source), metrics.clone());

    // Standing at the Main Building
    navigator.record_position(PositionSample::new(Coordinate::new(39.9042, 116.4074), 3.0, epoch_ms()));
    let library = setup.store.location(LocationId(2)).unwrap().unwrap();
    navigator.start(&library).unwrap();
    assert_eq!(navigator.status().driver, Some(DriverKind::Live));

    for (lat, lon) in [(39.9042, 116.4074), (39.9047, 116.4079), (39.9052, 116.4084)] {
        feed.publish(PositionSample::new(Coordinate::new(lat, lon), 3.0, epoch_ms()));
    }

    wait_for_state(&navigator, SessionState::Arrived).await;
    assert_eq!(metrics.instructions_announced(), 3);
    assert_eq!(setup.store.recent_history(5).unwrap().len(), 1);

    // Nothing is delivered once the session is over
    feed.publish(PositionSample::new(Coordinate::new(39.9052, 116.4084), 3.0, epoch_ms()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(metrics.instructions_announced(), 3);

    drop(navigator);
    speech.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_destination_reports_once() {
    let setup = file_store();
    let metrics = Arc::new(Metrics::new());
    let (queue, worker) = create_speech_queue(64, metrics.clone(), Box::new(|_| {}));
    let speech = tokio::spawn(worker.run());
    let navigator =
        Navigator::new(Config::default(), setup.store.clone(), Arc::new(queue), None, metrics.clone());

    let gym = setup.store.location(LocationId(5)).unwrap().unwrap();
    let result = navigator.start(&gym);

    assert!(matches!(result, Err(NavigationError::RouteNotFound { .. })));
    assert_eq!(navigator.state(), SessionState::Idle);
    assert!(navigator.history(10).unwrap().is_empty());
    assert_eq!(metrics.report().route_not_found, 1);

    drop(navigator);
    speech.await.unwrap();
}
