//! Speech queue - renders announcements off the navigation path
//!
//! The navigator never waits on speech output. `SpeechQueue` implements
//! `Announcer` by enqueueing on a bounded mpsc channel; `SpeechWorker` drains it
//! and hands each utterance to a renderer. An interrupting utterance bumps the
//! queue epoch so anything queued before it is skipped.

use crate::infra::metrics::Metrics;
use crate::io::announcer::{Announcer, Priority, SoundCue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// A queued speech command
#[derive(Debug, Clone)]
pub enum SpeechCmd {
    Say { text: String, priority: Priority },
    Sound(SoundCue),
}

#[derive(Debug)]
struct Queued {
    cmd: SpeechCmd,
    epoch: u64,
    enqueued_at: Instant,
}

/// Renders one command; the binary prints, tests record
pub type Renderer = Box<dyn FnMut(&SpeechCmd) + Send>;

/// Producer half, cheap to clone
#[derive(Clone)]
pub struct SpeechQueue {
    tx: mpsc::Sender<Queued>,
    epoch: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
}

impl SpeechQueue {
    fn enqueue(&self, cmd: SpeechCmd) {
        let queued =
            Queued { cmd, epoch: self.epoch.load(Ordering::Acquire), enqueued_at: Instant::now() };
        match self.tx.try_send(queued) {
            Ok(()) => {}
            Err(TrySendError::Full(q)) => {
                self.metrics.record_speech_dropped();
                warn!(cmd = ?q.cmd, "speech_dropped: queue full");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("speech_queue_closed");
            }
        }
    }
}

impl Announcer for SpeechQueue {
    fn speak(&self, text: &str, priority: Priority, interrupt: bool) {
        if interrupt {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        self.enqueue(SpeechCmd::Say { text: text.to_string(), priority });
    }

    fn play_sound(&self, cue: SoundCue) {
        self.enqueue(SpeechCmd::Sound(cue));
    }
}

/// Consumer half
pub struct SpeechWorker {
    rx: mpsc::Receiver<Queued>,
    epoch: Arc<AtomicU64>,
    renderer: Renderer,
}

impl SpeechWorker {
    /// Run the worker, rendering commands until every queue handle is dropped
    pub async fn run(mut self) {
        info!("speech_worker_started");

        while let Some(queued) = self.rx.recv().await {
            if queued.epoch < self.epoch.load(Ordering::Acquire) {
                debug!(cmd = ?queued.cmd, "speech_skipped_interrupted");
                continue;
            }

            let queue_delay_us = queued.enqueued_at.elapsed().as_micros() as u64;
            debug!(queue_delay_us = %queue_delay_us, "speech_dequeued");
            (self.renderer)(&queued.cmd);
        }

        info!("speech_worker_stopped");
    }
}

/// Create a speech queue and its worker
///
/// Returns the queue (an `Announcer`) and the worker (to be spawned)
pub fn create_speech_queue(
    buffer_size: usize,
    metrics: Arc<Metrics>,
    renderer: Renderer,
) -> (SpeechQueue, SpeechWorker) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let epoch = Arc::new(AtomicU64::new(0));
    let queue = SpeechQueue { tx, epoch: epoch.clone(), metrics };
    let worker = SpeechWorker { rx, epoch, renderer };
    (queue, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording() -> (Arc<Mutex<Vec<String>>>, Renderer) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let renderer: Renderer = Box::new(move |cmd| {
            let line = match cmd {
                SpeechCmd::Say { text, .. } => text.clone(),
                SpeechCmd::Sound(cue) => format!("<{}>", cue.as_str()),
            };
            sink.lock().push(line);
        });
        (seen, renderer)
    }

    #[tokio::test]
    async fn test_renders_in_order() {
        let (seen, renderer) = recording();
        let (queue, worker) = create_speech_queue(8, Arc::new(Metrics::new()), renderer);

        queue.play_sound(SoundCue::NavigationStart);
        queue.speak("Navigating to Library", Priority::NORMAL, false);
        drop(queue);
        worker.run().await;

        assert_eq!(*seen.lock(), vec!["<navigation_start>", "Navigating to Library"]);
    }

    #[tokio::test]
    async fn test_interrupt_skips_queued() {
        let (seen, renderer) = recording();
        let (queue, worker) = create_speech_queue(8, Arc::new(Metrics::new()), renderer);

        queue.speak("first", Priority::NORMAL, false);
        queue.speak("second", Priority::NORMAL, false);
        queue.speak("urgent", Priority::URGENT, true);
        drop(queue);
        worker.run().await;

        assert_eq!(*seen.lock(), vec!["urgent"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let (_seen, renderer) = recording();
        let metrics = Arc::new(Metrics::new());
        let (queue, _worker) = create_speech_queue(1, metrics.clone(), renderer);

        queue.speak("one", Priority::NORMAL, false);
        queue.speak("two", Priority::NORMAL, false);

        assert_eq!(metrics.speech_dropped(), 1);
    }
}
