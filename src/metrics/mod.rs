//! Metrics module for Prometheus
//!
//! This module provides metrics collection for the gateway service:
//! - Request count by method, outcome, and status
//! - Upstream call latency histogram by outcome

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Gateway metrics collector
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    request_counter: CounterVec,
    upstream_latency: HistogramVec,
}

impl GatewayMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_counter = CounterVec::new(
            Opts::new(
                "license_gateway_requests_total",
                "Total number of gateway requests",
            ),
            &["method", "outcome", "status"],
        )
        .expect("Failed to create request counter");

        let upstream_latency = HistogramVec::new(
            HistogramOpts::new(
                "license_gateway_upstream_latency_seconds",
                "Upstream verification latency in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0,
            ]),
            &["outcome"],
        )
        .expect("Failed to create latency histogram");

        registry
            .register(Box::new(request_counter.clone()))
            .expect("Failed to register request counter");
        registry
            .register(Box::new(upstream_latency.clone()))
            .expect("Failed to register latency histogram");

        Self {
            registry,
            request_counter,
            upstream_latency,
        }
    }

    /// Record a handled request
    pub fn record_request(&self, method: &str, outcome: &str, status: u16) {
        self.request_counter
            .with_label_values(&[method, outcome, &status.to_string()])
            .inc();
    }

    /// Record how long an upstream call took
    pub fn record_upstream_latency(&self, outcome: &str, latency: Duration) {
        self.upstream_latency
            .with_label_values(&[outcome])
            .observe(latency.as_secs_f64());
    }

    /// Get the Prometheus metrics output
    pub fn prometheus_output(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = GatewayMetrics::new();
        let output = metrics.prometheus_output().unwrap();
        assert!(!output.contains("license_gateway_requests_total{"));
    }

    #[test]
    fn test_record_request() {
        let metrics = GatewayMetrics::new();

        metrics.record_request("GET", "succeeded", 200);
        metrics.record_request("GET", "succeeded", 200);
        metrics.record_request("DELETE", "method_not_allowed", 405);

        let output = metrics.prometheus_output().unwrap();
        assert!(output.contains(
            "license_gateway_requests_total{method=\"GET\",outcome=\"succeeded\",status=\"200\"} 2"
        ));
        assert!(output.contains(
            "license_gateway_requests_total{method=\"DELETE\",outcome=\"method_not_allowed\",status=\"405\"} 1"
        ));
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = GatewayMetrics::new();
        metrics.record_request("GET", "succeeded", 200);
        metrics.record_upstream_latency("succeeded", Duration::from_millis(30));

        let output = metrics.prometheus_output().unwrap();
        assert!(output.contains("license_gateway_requests_total"));
        assert!(output.contains("outcome=\"succeeded\""));
        assert!(output.contains("license_gateway_upstream_latency_seconds"));
    }
}
