//! Live positioning - TCP fix listener and broadcast feed
//!
//! Positioning clients connect to the configured port and stream one JSON fix per line:
//! `{"lat": 39.9042, "lon": 116.4074, "accuracy": 4.0, "timestamp": 1767617600000}`
//! `accuracy` and `timestamp` (epoch ms) are optional; the receipt time stands in
//! for a missing timestamp. Valid fixes are published on a `PositionFeed`.

use crate::domain::trip::epoch_ms;
use crate::domain::types::{Coordinate, PositionSample};
use crate::infra::metrics::Metrics;
use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Capability to receive live position samples
pub trait PositionSource: Send + Sync {
    /// Start receiving samples. Fails when the source cannot deliver.
    fn subscribe(&self) -> anyhow::Result<broadcast::Receiver<PositionSample>>;
}

/// Fan-out of live samples to every subscriber
#[derive(Clone)]
pub struct PositionFeed {
    tx: broadcast::Sender<PositionSample>,
}

impl PositionFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a sample; returns how many subscribers received it
    pub fn publish(&self, sample: PositionSample) -> usize {
        self.tx.send(sample).unwrap_or(0)
    }
}

impl PositionSource for PositionFeed {
    fn subscribe(&self) -> anyhow::Result<broadcast::Receiver<PositionSample>> {
        Ok(self.tx.subscribe())
    }
}

/// Wire format of one fix
#[derive(Debug, Deserialize)]
struct PositionFix {
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "lng", alias = "longitude")]
    lon: f64,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    timestamp: Option<u64>,
}

/// Parse one line into a sample, rejecting out-of-range coordinates
pub fn parse_fix(line: &str, received_at_ms: u64) -> Result<PositionSample, String> {
    let fix: PositionFix = serde_json::from_str(line).map_err(|e| e.to_string())?;

    if !fix.lat.is_finite() || !(-90.0..=90.0).contains(&fix.lat) {
        return Err(format!("latitude out of range: {}", fix.lat));
    }
    if !fix.lon.is_finite() || !(-180.0..=180.0).contains(&fix.lon) {
        return Err(format!("longitude out of range: {}", fix.lon));
    }
    let accuracy_m = fix.accuracy.filter(|a| a.is_finite() && *a >= 0.0).unwrap_or(0.0);

    Ok(PositionSample::new(
        Coordinate::new(fix.lat, fix.lon),
        accuracy_m,
        fix.timestamp.unwrap_or(received_at_ms),
    ))
}

/// Bind the TCP fix listener on all interfaces
pub async fn bind_position_listener(port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("0.0.0.0:{}", port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind position listener on {addr}"))
}

/// Bind the listener and serve it in the background.
///
/// Returns the feed it publishes to, or `None` when the port cannot be bound.
/// A source that can never publish counts as absent, so callers fall back to
/// synthetic playback.
pub async fn spawn_position_listener(
    port: u16,
    capacity: usize,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> Option<PositionFeed> {
    let listener = match bind_position_listener(port).await {
        Ok(listener) => listener,
        Err(e) => {
            metrics.record_driver_fallback();
            error!(error = %format!("{e:#}"), port = %port, "position_listener_unavailable");
            return None;
        }
    };

    let feed = PositionFeed::new(capacity);
    tokio::spawn(serve_position_listener(listener, feed.clone(), metrics, shutdown));
    Some(feed)
}

/// Accept positioning clients until shutdown
///
/// Malformed lines are logged and counted, never fatal.
pub async fn serve_position_listener(
    listener: TcpListener,
    feed: PositionFeed,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    match listener.local_addr() {
        Ok(addr) => info!(addr = %addr, "position_listener_started"),
        Err(e) => warn!(error = %e, "position_listener_addr_unknown"),
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("position_listener_shutdown");
                    return;
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let feed = feed.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_fix_connection(socket, addr, feed, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "position_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_fix_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    feed: PositionFeed,
    metrics: Arc<Metrics>,
) {
    debug!(peer = %addr, "position_connection_accepted");

    let reader = BufReader::new(socket);
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_fix(line, epoch_ms()) {
            Ok(sample) => {
                metrics.record_position_fix();
                let receivers = feed.publish(sample);
                debug!(
                    peer = %addr,
                    position = %sample.coordinate,
                    accuracy_m = %sample.accuracy_m,
                    receivers = %receivers,
                    "position_fix_received"
                );
            }
            Err(reason) => {
                metrics.record_position_fix_invalid();
                warn!(peer = %addr, reason = %reason, "position_fix_invalid");
            }
        }
    }

    debug!(peer = %addr, "position_connection_closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_fix() {
        let sample =
            parse_fix(r#"{"lat": 39.9042, "lon": 116.4074, "accuracy": 4.5, "timestamp": 1000}"#, 5)
                .unwrap();
        assert_eq!(sample.coordinate, Coordinate::new(39.9042, 116.4074));
        assert_eq!(sample.accuracy_m, 4.5);
        assert_eq!(sample.captured_at_ms, 1000);
    }

    #[test]
    fn test_parse_defaults_timestamp_to_receipt() {
        let sample = parse_fix(r#"{"latitude": 1.0, "lng": 2.0}"#, 777).unwrap();
        assert_eq!(sample.captured_at_ms, 777);
        assert_eq!(sample.accuracy_m, 0.0);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(parse_fix(r#"{"lat": 91.0, "lon": 0.0}"#, 0).is_err());
        assert!(parse_fix(r#"{"lat": 0.0, "lon": -180.5}"#, 0).is_err());
        assert!(parse_fix("not json", 0).is_err());
    }

    #[tokio::test]
    async fn test_feed_fan_out() {
        let feed = PositionFeed::new(8);
        let mut a = feed.subscribe().unwrap();
        let mut b = feed.subscribe().unwrap();

        let sample = PositionSample::new(Coordinate::new(1.0, 2.0), 3.0, 4);
        assert_eq!(feed.publish(sample), 2);
        assert_eq!(a.recv().await.unwrap(), sample);
        assert_eq!(b.recv().await.unwrap(), sample);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = PositionFeed::new(8);
        assert_eq!(feed.publish(PositionSample::new(Coordinate::new(0.0, 0.0), 0.0, 0)), 0);
    }

    #[tokio::test]
    async fn test_listener_publishes_fixes() {
        use tokio::io::AsyncWriteExt;

        let listener = bind_position_listener(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let feed = PositionFeed::new(8);
        let mut rx = feed.subscribe().unwrap();
        let metrics = Arc::new(Metrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server =
            tokio::spawn(serve_position_listener(listener, feed, metrics.clone(), shutdown_rx));

        let mut client = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        client
            .write_all(b"garbage\n{\"lat\": 39.9047, \"lon\": 116.4079, \"timestamp\": 42}\n")
            .await
            .unwrap();

        let sample = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sample.coordinate, Coordinate::new(39.9047, 116.4079));
        assert_eq!(sample.captured_at_ms, 42);
        assert_eq!(metrics.report().position_fixes_invalid, 1);

        shutdown_tx.send(true).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_occupied_port_leaves_no_live_source() {
        let occupied = bind_position_listener(0).await.unwrap();
        let port = occupied.local_addr().unwrap().port();
        let metrics = Arc::new(Metrics::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        assert!(bind_position_listener(port).await.is_err());
        let feed = spawn_position_listener(port, 8, metrics.clone(), shutdown_rx).await;

        assert!(feed.is_none());
        assert_eq!(metrics.driver_fallbacks(), 1);
    }

    #[tokio::test]
    async fn test_bound_port_yields_live_source() {
        let metrics = Arc::new(Metrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let feed = spawn_position_listener(0, 8, metrics.clone(), shutdown_rx).await;

        assert!(feed.is_some());
        assert_eq!(metrics.driver_fallbacks(), 0);
        shutdown_tx.send(true).unwrap();
    }
}
