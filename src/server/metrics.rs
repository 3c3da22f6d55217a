use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all pipeline metrics
const PREFIX: &str = "export_pipeline";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Dispatch loops
    pub static ref DISPATCH_TICKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_dispatch_ticks_total"), "Dispatch loop ticks by outcome"),
        &["category", "outcome"]
    ).expect("Failed to create dispatch_ticks_total metric");

    pub static ref JOBS_PROCESSED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_processed_total"), "Jobs handled by result"),
        &["category", "result"]
    ).expect("Failed to create jobs_processed_total metric");

    pub static ref QUEUE_DEPTH: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_queue_depth"), "Jobs waiting per queue category"),
        &["category"]
    ).expect("Failed to create queue_depth metric");

    // Worker pools
    pub static ref RENDER_IN_FLIGHT: Gauge = Gauge::new(
        format!("{PREFIX}_render_in_flight"),
        "Renderer processes currently running"
    ).expect("Failed to create render_in_flight metric");

    pub static ref PUBLISH_IN_FLIGHT: Gauge = Gauge::new(
        format!("{PREFIX}_publish_in_flight"),
        "Publish operations currently running"
    ).expect("Failed to create publish_in_flight metric");

    // Mail
    pub static ref MAIL_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_mail_attempts_total"), "Mail send attempts per endpoint"),
        &["endpoint", "result"]
    ).expect("Failed to create mail_attempts_total metric");
}

/// Register every metric with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(DISPATCH_TICKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_PROCESSED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_DEPTH.clone()));
    let _ = REGISTRY.register(Box::new(RENDER_IN_FLIGHT.clone()));
    let _ = REGISTRY.register(Box::new(PUBLISH_IN_FLIGHT.clone()));
    let _ = REGISTRY.register(Box::new(MAIL_ATTEMPTS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_dispatch_tick(category: &str, outcome: &str) {
    DISPATCH_TICKS_TOTAL
        .with_label_values(&[category, outcome])
        .inc();
}

pub fn record_job_result(category: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    JOBS_PROCESSED_TOTAL
        .with_label_values(&[category, result])
        .inc();
}

pub fn set_queue_depth(category: &str, depth: usize) {
    QUEUE_DEPTH.with_label_values(&[category]).set(depth as f64);
}

pub fn set_render_in_flight(count: usize) {
    RENDER_IN_FLIGHT.set(count as f64);
}

pub fn set_publish_in_flight(count: usize) {
    PUBLISH_IN_FLIGHT.set(count as f64);
}

pub fn record_mail_attempt(endpoint: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    MAIL_ATTEMPTS_TOTAL
        .with_label_values(&[endpoint, result])
        .inc();
}

/// Collapse concrete request paths into a bounded set of labels.
pub fn categorize_endpoint(path: &str) -> &'static str {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        [""] => "/",
        ["export", _, "create"] => "/export/{kind}/create",
        ["export", _, "status"] => "/export/{kind}/status",
        ["status"] => "/status",
        ["upload"] => "/upload",
        ["continue"] => "/continue",
        _ => "other",
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
