//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `store` - Campus dataset and trip history behind the `CampusStore` trait
//! - `history` - Trip history output to file (JSONL format)
//! - `announcer` - Spoken announcement contract
//! - `speech` - Bounded speech queue and its worker
//! - `positioning` - TCP listener for live position fixes
//! - `status` - Status and control HTTP endpoint

pub mod announcer;
pub mod history;
pub mod positioning;
pub mod speech;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use announcer::{Announcement, Announcer, Priority, SoundCue, TracingAnnouncer};
pub use history::HistoryLog;
pub use positioning::{
    bind_position_listener, serve_position_listener, spawn_position_listener, PositionFeed,
    PositionSource,
};
pub use speech::{create_speech_queue, SpeechCmd, SpeechQueue, SpeechWorker};
pub use status::{start_status_server, StatusContext};
pub use store::{Campus, CampusStore, FileStore, MemoryStore};
