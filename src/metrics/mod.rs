use crate::error::{GatewayError, Result};
use axum::{extract::State, http::header, response::IntoResponse};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Prometheus recorder and render handle
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GatewayError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "gateway_requests_total",
            "Total number of HTTP requests forwarded upstream"
        );
        describe_histogram!(
            "gateway_request_duration_seconds",
            "Forwarded request latencies in seconds"
        );
        describe_counter!(
            "gateway_session_checks_total",
            "Identity endpoint checks by outcome"
        );
        describe_counter!(
            "gateway_access_denied_total",
            "Requests short-circuited by the access stages"
        );

        debug!("Metric descriptions registered");
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// `GET /metrics`
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record a forwarded request
pub fn record_request(method: &str, path: &str, status: u16, duration: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(duration);
}

/// Record an identity check outcome: `authenticated`, `rejected` or `unavailable`
pub fn record_session_check(outcome: &'static str) {
    counter!("gateway_session_checks_total", "outcome" => outcome).increment(1);
}

/// Record a request denied by an access stage
pub fn record_access_denied(reason: &'static str) {
    counter!("gateway_access_denied_total", "reason" => reason).increment(1);
}

/// Collapse id-like path segments so consultation and response ids don't explode label cardinality
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| if is_likely_id(segment) { ":id" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_likely_id(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    // UUIDs, with or without hyphens
    let hex: String = segment.chars().filter(|c| *c != '-').collect();
    hex.len() == 32 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Measures one forwarded request
pub struct Timer {
    start: Instant,
    method: String,
    path: String,
}

impl Timer {
    pub fn new(method: String, path: String) -> Self {
        Self {
            start: Instant::now(),
            method,
            path,
        }
    }

    /// Record the elapsed time with the given status code
    pub fn record(self, status: u16) {
        record_request(&self.method, &self.path, status, self.elapsed());
    }

    /// Elapsed time in seconds
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/consultations/123/responses/"),
            "/api/consultations/:id/responses/"
        );
        assert_eq!(
            sanitize_path("/consultations/550e8400-e29b-41d4-a716-446655440000/"),
            "/consultations/:id/"
        );
        assert_eq!(sanitize_path("/api/user/me/"), "/api/user/me/");
        assert_eq!(sanitize_path("/"), "/");
    }

    #[test]
    fn test_is_likely_id() {
        assert!(is_likely_id("42"));
        assert!(is_likely_id("550e8400e29b41d4a716446655440000"));
        assert!(!is_likely_id("consultations"));
        assert!(!is_likely_id(""));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new("GET".to_string(), "/consultations/".to_string());
        assert!(timer.elapsed() >= 0.0);
        timer.record(200);
    }

    #[test]
    fn test_record_functions_dont_panic() {
        // No recorder installed, these are no-ops
        record_request("GET", "/api/consultations/", 200, 0.01);
        record_session_check("authenticated");
        record_access_denied("dashboard");
    }
}
