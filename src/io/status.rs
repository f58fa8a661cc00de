//! Status HTTP endpoint
//!
//! Small control and observation surface for the running navigator:
//! - `GET /health` - liveness
//! - `GET /status` - session snapshot as JSON
//! - `GET /nearby?radius=<m>` - known places around the current position
//! - `GET /metrics` - counters in Prometheus text format
//! - `POST /navigate?to=<location id>` - start a session
//! - `POST /stop` - stop the running session

use crate::domain::types::LocationId;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::io::store::CampusStore;
use crate::services::navigator::{NavigationError, Navigator};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Everything a request handler may touch
pub struct StatusContext {
    pub navigator: Arc<Navigator>,
    pub store: Arc<dyn CampusStore>,
    pub metrics: Arc<Metrics>,
    pub default_radius_m: f64,
}

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Format a summary in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(2048);

    let counters = [
        ("wayfinder_ticks_total", "Position ticks processed", summary.ticks_total),
        ("wayfinder_late_ticks_total", "Ticks discarded for an ended session", summary.late_ticks_dropped),
        ("wayfinder_stale_samples_total", "Samples too old to act on", summary.stale_samples),
        ("wayfinder_sessions_started_total", "Navigation sessions started", summary.sessions_started),
        ("wayfinder_sessions_arrived_total", "Sessions that reached the destination", summary.sessions_arrived),
        ("wayfinder_sessions_stopped_total", "Sessions stopped by the user", summary.sessions_stopped),
        ("wayfinder_route_not_found_total", "Start requests without a route", summary.route_not_found),
        ("wayfinder_no_locations_total", "Start requests with no known locations", summary.no_locations_known),
        ("wayfinder_store_failures_total", "Store read or write failures", summary.store_failures),
        ("wayfinder_driver_fallbacks_total", "Live driver failures replaced by synthetic", summary.driver_fallbacks),
        ("wayfinder_instructions_total", "Instructions announced", summary.instructions_announced),
        ("wayfinder_instructions_suppressed_total", "Repeated instructions suppressed", summary.instructions_suppressed),
        ("wayfinder_speech_dropped_total", "Utterances dropped on a full speech queue", summary.speech_dropped),
        ("wayfinder_position_fixes_total", "Valid position fixes received", summary.position_fixes_received),
        ("wayfinder_position_fixes_invalid_total", "Malformed position fixes", summary.position_fixes_invalid),
    ];
    for (name, help, val) in counters {
        write_metric(&mut output, name, help, MetricType::Counter, val);
    }

    write_metric(
        &mut output,
        "wayfinder_tick_latency_avg_us",
        "Average tick processing latency since last scrape",
        MetricType::Gauge,
        summary.avg_tick_latency_us,
    );
    write_metric(
        &mut output,
        "wayfinder_tick_latency_max_us",
        "Maximum tick processing latency since last scrape",
        MetricType::Gauge,
        summary.max_tick_latency_us,
    );

    output
}

#[derive(Serialize)]
struct NearbyEntry {
    id: LocationId,
    name: String,
    category: String,
    distance_m: f64,
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_string(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => {
            error!(error = %e, "status_serialize_failed");
            respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "serialize failed".to_string())
        }
    }
}

fn json_error(status: StatusCode, error: String) -> Response<Full<Bytes>> {
    json(status, &ErrorBody { ok: false, error })
}

/// Value of `key` in a `a=1&b=2` query string
fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then_some(v)
    })
}

/// Route one request
fn route(method: &Method, path: &str, query: Option<&str>, ctx: &StatusContext) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok".to_string()),
        (&Method::GET, "/status") => json(StatusCode::OK, &ctx.navigator.status()),
        (&Method::GET, "/metrics") => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&ctx.metrics.report()),
        ),
        (&Method::GET, "/nearby") => {
            let radius = match query_param(query, "radius") {
                None => ctx.default_radius_m,
                Some(raw) => match raw.parse::<f64>() {
                    Ok(r) if r.is_finite() && r >= 0.0 => r,
                    _ => return json_error(StatusCode::BAD_REQUEST, format!("invalid radius: {raw}")),
                },
            };
            let entries: Vec<NearbyEntry> = ctx
                .navigator
                .nearby_locations(radius)
                .into_iter()
                .map(|(l, d)| NearbyEntry { id: l.id, name: l.name, category: l.category, distance_m: d })
                .collect();
            json(StatusCode::OK, &entries)
        }
        (&Method::POST, "/navigate") => {
            let Some(raw) = query_param(query, "to") else {
                return json_error(StatusCode::BAD_REQUEST, "missing 'to' parameter".to_string());
            };
            let Ok(id) = raw.parse::<i64>() else {
                return json_error(StatusCode::BAD_REQUEST, format!("invalid location id: {raw}"));
            };
            let destination = match ctx.store.location(LocationId(id)) {
                Ok(Some(location)) => location,
                Ok(None) => {
                    return json_error(StatusCode::NOT_FOUND, format!("unknown location {id}"))
                }
                Err(e) => {
                    return json_error(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}"));
                }
            };
            match ctx.navigator.start(&destination) {
                Ok(()) => json(StatusCode::OK, &ctx.navigator.status()),
                Err(e @ NavigationError::Store(_)) => {
                    json_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
                }
                Err(e) => json_error(StatusCode::CONFLICT, e.to_string()),
            }
        }
        (&Method::POST, "/stop") => {
            let stopped = ctx.navigator.stop();
            respond(StatusCode::OK, "application/json", format!(r#"{{"ok":true,"stopped":{stopped}}}"#))
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ctx: Arc<StatusContext>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = route(req.method(), req.uri().path(), req.uri().query(), &ctx);
    if response.status().is_client_error() && response.status() != StatusCode::NOT_FOUND {
        warn!(method = %req.method(), uri = %req.uri(), status = %response.status(), "status_request_rejected");
    }
    Ok(response)
}

/// Start the status HTTP server
pub async fn start_status_server(
    port: u16,
    ctx: Arc<StatusContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "status_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let ctx = ctx.clone();
                                async move { handle_request(req, ctx).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
