//! Tick drivers - the two ways a session is fed
//!
//! A driver delivers ticks for exactly one session. Ticks carry the session id
//! they were attached for; the navigator discards ticks from any other session,
//! so a driver left running after its session ended cannot reach a new one.
//!
//! - `LiveDriver` forwards samples from a `PositionSource`
//! - `SyntheticDriver` plays the route open-loop on a fixed interval

use crate::io::positioning::PositionSource;
use crate::services::navigator::{NavigationError, Navigator, SessionId};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Live,
    Synthetic,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Live => "live",
            DriverKind::Synthetic => "synthetic",
        }
    }
}

/// Where a driver delivers its ticks
#[derive(Clone)]
pub struct TickTarget {
    pub(crate) navigator: Weak<Navigator>,
    pub(crate) session: SessionId,
}

/// Position-tick source capability
pub trait TickDriver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Start delivering ticks to `target`
    fn attach(&self, target: TickTarget) -> Result<DriverHandle, NavigationError>;
}

/// A running driver. Dropping the handle detaches it.
#[derive(Debug)]
pub struct DriverHandle {
    kind: DriverKind,
    session: SessionId,
    task: JoinHandle<()>,
}

impl DriverHandle {
    pub fn kind(&self) -> DriverKind {
        self.kind
    }

    /// Cancel the driver task; no further ticks are produced
    pub fn detach(self) {
        debug!(driver = %self.kind.as_str(), session = %self.session, "driver_detached");
        // Drop aborts the task
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_driver<F>(kind: DriverKind, session: SessionId, fut: F) -> Result<DriverHandle, NavigationError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| NavigationError::DriverAttachFailure(e.to_string()))?;
    let task = runtime.spawn(fut);
    info!(driver = %kind.as_str(), session = %session, "driver_attached");
    Ok(DriverHandle { kind, session, task })
}

/// Forwards live samples to the navigator
pub struct LiveDriver {
    source: Arc<dyn PositionSource>,
}

impl LiveDriver {
    pub fn new(source: Arc<dyn PositionSource>) -> Self {
        Self { source }
    }
}

impl TickDriver for LiveDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Live
    }

    fn attach(&self, target: TickTarget) -> Result<DriverHandle, NavigationError> {
        let mut rx = self
            .source
            .subscribe()
            .map_err(|e| NavigationError::DriverAttachFailure(format!("{e:#}")))?;
        let session = target.session;

        spawn_driver(DriverKind::Live, session, async move {
            loop {
                match rx.recv().await {
                    Ok(sample) => {
                        let Some(navigator) = target.navigator.upgrade() else { break };
                        if !navigator.deliver_live(target.session, sample) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session = %target.session, skipped = %skipped, "live_driver_lagged");
                    }
                    Err(RecvError::Closed) => {
                        warn!(session = %target.session, "live_source_closed");
                        break;
                    }
                }
            }
            debug!(session = %target.session, "live_driver_finished");
        })
    }
}

/// Plays one waypoint per interval, first one immediately
pub struct SyntheticDriver {
    interval: Duration,
}

impl SyntheticDriver {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl TickDriver for SyntheticDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Synthetic
    }

    fn attach(&self, target: TickTarget) -> Result<DriverHandle, NavigationError> {
        let period = self.interval;
        let session = target.session;

        spawn_driver(DriverKind::Synthetic, session, async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(navigator) = target.navigator.upgrade() else { break };
                if !navigator.synthetic_step(target.session) {
                    break;
                }
            }
            debug!(session = %target.session, "synthetic_driver_finished");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_outside_runtime_fails() {
        let driver = SyntheticDriver::new(Duration::from_millis(10));
        let target = TickTarget { navigator: Weak::new(), session: SessionId(1) };
        let result = driver.attach(target);
        assert!(matches!(result, Err(NavigationError::DriverAttachFailure(_))));
    }

    #[tokio::test]
    async fn test_driver_exits_when_navigator_gone() {
        let driver = SyntheticDriver::new(Duration::from_millis(1));
        let target = TickTarget { navigator: Weak::new(), session: SessionId(1) };
        let handle = driver.attach(target).unwrap();
        assert_eq!(handle.kind(), DriverKind::Synthetic);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.task.is_finished());
    }
}
