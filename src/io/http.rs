//! HTTP surface: Prometheus metrics and scanner control
//!
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /health` - liveness
//! - `GET /scanner/state` - run state and filter method as JSON
//! - `POST /scanner/{pause,start,stop}` - run state control
//! - `POST /scanner/filter?method=<name>` - request a filter method

use crate::domain::types::FilterMethod;
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::scanner::ScannerHandle;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for request handlers
pub struct HttpContext {
    pub metrics: Arc<Metrics>,
    pub scanner: ScannerHandle,
    pub site_id: String,
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

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

fn write_gauge_f64(output: &mut String, name: &str, help: &str, site: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val:.6}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_cycle_metrics(&mut output, site_id, &summary);
    write_tag_metrics(&mut output, site_id, &summary);
    write_scanner_metrics(&mut output, site_id, &summary);

    output
}

fn write_cycle_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "shelf_scan_cycles_total",
        "Completed scan cycles",
        MetricType::Counter,
        site,
        summary.cycles_total,
    );
    write_gauge_f64(
        output,
        "shelf_scan_cycles_per_min",
        "Scan cycles per minute since the last report",
        site,
        summary.cycles_per_min,
    );
    write_metric(
        output,
        "shelf_records_total",
        "Well-formed detection records parsed",
        MetricType::Counter,
        site,
        summary.records_total,
    );
    write_metric(
        output,
        "shelf_bytes_total",
        "Bytes received from the reader",
        MetricType::Counter,
        site,
        summary.bytes_total,
    );
    write_histogram(
        output,
        "shelf_cycle_process_us",
        "Cycle processing time (parse, filter, compare) in microseconds",
        site,
        &summary.process_buckets,
        summary.process_sum_total_us,
    );
    write_metric(
        output,
        "shelf_cycle_process_p99_us",
        "99th percentile cycle processing time",
        MetricType::Gauge,
        site,
        summary.process_p99_us,
    );
    write_metric(
        output,
        "shelf_cycle_process_max_us",
        "Maximum cycle processing time in the current report interval",
        MetricType::Gauge,
        site,
        summary.process_max_us,
    );
}

fn write_tag_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "shelf_tracked_tags",
        "Tag filters held across all antennas",
        MetricType::Gauge,
        site,
        summary.tracked_tags,
    );
    write_metric(
        output,
        "shelf_present_tags",
        "Tags settled as present across all antennas",
        MetricType::Gauge,
        site,
        summary.present_tags,
    );
    write_metric(
        output,
        "shelf_change_events_total",
        "Change events emitted",
        MetricType::Counter,
        site,
        summary.changes_total,
    );
}

fn write_scanner_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "shelf_scanner_state",
        "Scanner run state (0=running, 1=paused, 2=stopped)",
        MetricType::Gauge,
        site,
        summary.scanner_state as u64,
    );
    write_metric(
        output,
        "shelf_filter_method",
        "Active filter method (0=none, 1=window_lpf, 2=hmm_viterbi)",
        MetricType::Gauge,
        site,
        u64::from(summary.filter_method.as_u8()),
    );
    write_metric(
        output,
        "shelf_filter_switches_total",
        "Filter method changes applied",
        MetricType::Counter,
        site,
        summary.filter_switches_total,
    );
    write_metric(
        output,
        "shelf_transport_failures_total",
        "Reader transport failures",
        MetricType::Counter,
        site,
        summary.transport_failures_total,
    );
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn respond_json(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    respond(status, "application/json", body.to_string())
}

fn scanner_state_json(scanner: &ScannerHandle) -> serde_json::Value {
    json!({
        "state": scanner.state(),
        "filter_method": scanner.filter_method(),
        "requested_filter_method": scanner.requested_filter_method(),
    })
}

/// Outcome of a control call: 200 when applied, 409 when the current state
/// does not allow it
fn control_response(applied: bool, scanner: &ScannerHandle) -> Response<Full<Bytes>> {
    let status = if applied { StatusCode::OK } else { StatusCode::CONFLICT };
    let mut body = scanner_state_json(scanner);
    body["ok"] = json!(applied);
    respond_json(status, body)
}

fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find_map(|(k, v)| (k == key).then_some(v))
}

/// Route one request. Split out from the hyper plumbing for testing.
pub fn route(method: &Method, path: &str, query: Option<&str>, ctx: &HttpContext) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => respond(
            StatusCode::OK,
            PROMETHEUS_CONTENT_TYPE,
            format_prometheus_metrics(&ctx.metrics, &ctx.site_id),
        ),
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        (&Method::GET, "/scanner/state") => respond_json(StatusCode::OK, scanner_state_json(&ctx.scanner)),
        (&Method::POST, "/scanner/pause") => control_response(ctx.scanner.pause(), &ctx.scanner),
        (&Method::POST, "/scanner/start") => control_response(ctx.scanner.start(), &ctx.scanner),
        (&Method::POST, "/scanner/stop") => control_response(ctx.scanner.stop(), &ctx.scanner),
        (&Method::POST, "/scanner/filter") => {
            let Some(name) = query_param(query, "method") else {
                return respond_json(
                    StatusCode::BAD_REQUEST,
                    json!({"ok": false, "error": "missing query parameter 'method'"}),
                );
            };
            match name.parse::<FilterMethod>() {
                Ok(method) => {
                    info!(method = %method, "http_filter_method_requested");
                    control_response(ctx.scanner.set_filter_method(method), &ctx.scanner)
                }
                Err(e) => respond_json(StatusCode::BAD_REQUEST, json!({"ok": false, "error": e.to_string()})),
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ctx: Arc<HttpContext>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!(method = %req.method(), path = %req.uri().path(), "http_request");
    Ok(route(req.method(), req.uri().path(), req.uri().query(), &ctx))
}

/// Serve metrics and scanner control until `shutdown` reads true
pub async fn start_http_server(
    port: u16,
    ctx: HttpContext,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let ctx = Arc::new(ctx);

    info!(port = %port, site = %ctx.site_id, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, ctx.clone()));
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
