//! License validation gateway
//!
//! This module handles the single gateway route:
//! - Method dispatch (GET only)
//! - `license`/`product` query validation
//! - Bounded-time forwarding to the upstream verification endpoint
//! - Normalizing the upstream outcome into a client response

use crate::config::{ErrorStatusPolicy, GatewayConfig};
use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use axum::body::{Body, Bytes};
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{Method, Response, StatusCode};
use axum::response::IntoResponse;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Characters left unescaped, matching JavaScript's `encodeURIComponent`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Cache directive for successful verification responses
pub const NO_STORE: &str = "no-store, no-cache, must-revalidate";

/// Validated inbound query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundQuery {
    pub license: String,
    pub product: String,
}

impl InboundQuery {
    /// Extract and validate `license` and `product` from a raw query string.
    ///
    /// Values are trimmed; a blank value counts as missing. When a parameter
    /// appears more than once the first occurrence is used.
    pub fn from_query(
        query: Option<&str>,
        min_license_length: usize,
    ) -> Result<Self, GatewayError> {
        let query = query.unwrap_or_default();
        let param = |name: &str| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let (license, product) = match (param("license"), param("product")) {
            (Some(license), Some(product)) => (license, product),
            _ => return Err(GatewayError::MissingParameters),
        };

        if license.chars().count() < min_license_length {
            return Err(GatewayError::InvalidLicense);
        }

        Ok(Self { license, product })
    }

    /// Upstream URL for this query: `{base}?License=..&Product=..`
    pub fn upstream_url(&self, base_url: &str) -> String {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}License={}&Product={}",
            base_url,
            separator,
            utf8_percent_encode(&self.license, URI_COMPONENT),
            utf8_percent_encode(&self.product, URI_COMPONENT)
        )
    }
}

/// What the upstream said, when it said anything at all
enum UpstreamReply {
    Verified(Bytes),
    Rejected(StatusCode),
}

/// The gateway: one inbound request yields at most one upstream call
pub struct ValidationGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_body_bytes: usize,
    min_license_length: usize,
    error_status_policy: ErrorStatusPolicy,
    metrics: Arc<GatewayMetrics>,
}

impl ValidationGateway {
    /// Create a gateway from configuration
    pub fn new(config: &GatewayConfig, metrics: Arc<GatewayMetrics>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.upstream.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.upstream.base_url.clone(),
            timeout: Duration::from_millis(config.upstream.timeout_ms),
            max_body_bytes: config.upstream.max_body_bytes,
            min_license_length: config.validation.min_license_length,
            error_status_policy: config.upstream.error_status_policy,
            metrics,
        })
    }

    /// Handle one inbound request. Never fails: every outcome is a response.
    ///
    /// OPTIONS never reaches this point when served through the router; the
    /// CORS layer answers it first.
    pub async fn handle(&self, method: &Method, query: Option<&str>) -> Response<Body> {
        match self.verify(method, query).await {
            Ok(response) => {
                self.metrics
                    .record_request(method.as_str(), "succeeded", response.status().as_u16());
                response
            }
            Err(err) => {
                self.metrics
                    .record_request(method.as_str(), err.outcome(), err.status().as_u16());
                err.into_response()
            }
        }
    }

    async fn verify(
        &self,
        method: &Method,
        query: Option<&str>,
    ) -> Result<Response<Body>, GatewayError> {
        if method != Method::GET {
            return Err(GatewayError::MethodNotAllowed);
        }

        let query = InboundQuery::from_query(query, self.min_license_length)?;
        let body = self.forward(&query).await?;

        Ok(([(CONTENT_TYPE, "text/plain"), (CACHE_CONTROL, NO_STORE)], body).into_response())
    }

    /// Call the upstream, bounded by the configured timeout.
    ///
    /// On timeout the in-flight request future is dropped, closing its
    /// connection; nothing outside this call is affected.
    async fn forward(&self, query: &InboundQuery) -> Result<Bytes, GatewayError> {
        let url = query.upstream_url(&self.base_url);
        debug!(product = %query.product, "Forwarding license verification");

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.fetch(&url)).await {
            Err(_) => {
                self.metrics
                    .record_upstream_latency("timed_out", start.elapsed());
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    product = %query.product,
                    "Upstream verification timed out"
                );
                Err(GatewayError::Timeout)
            }
            Ok(Err(e)) => {
                self.metrics
                    .record_upstream_latency("internal_error", start.elapsed());
                error!(error = %e, "Upstream verification failed");
                Err(GatewayError::Internal(e))
            }
            Ok(Ok(UpstreamReply::Rejected(status))) => {
                self.metrics
                    .record_upstream_latency("upstream_error", start.elapsed());
                warn!(
                    status = status.as_u16(),
                    product = %query.product,
                    "Upstream rejected license verification"
                );
                Err(self.upstream_error(status))
            }
            Ok(Ok(UpstreamReply::Verified(body))) => {
                self.metrics
                    .record_upstream_latency("succeeded", start.elapsed());
                Ok(body)
            }
        }
    }

    /// Send the request and read a success body of at most `max_body_bytes`
    async fn fetch(&self, url: &str) -> anyhow::Result<UpstreamReply> {
        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, "text/plain")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(UpstreamReply::Rejected(status));
        }
        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                anyhow::bail!(
                    "upstream body of {} bytes exceeds limit of {} bytes",
                    length,
                    self.max_body_bytes
                );
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_bytes {
                anyhow::bail!(
                    "upstream body exceeds limit of {} bytes",
                    self.max_body_bytes
                );
            }
            body.extend_from_slice(&chunk);
        }
        Ok(UpstreamReply::Verified(Bytes::from(body)))
    }

    /// Map a non-2xx upstream status according to the configured policy
    fn upstream_error(&self, status: StatusCode) -> GatewayError {
        match self.error_status_policy {
            ErrorStatusPolicy::Passthrough => GatewayError::Upstream {
                status,
                message: "License verification failed",
            },
            ErrorStatusPolicy::Fixed500 => GatewayError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Verification failed",
            },
        }
    }
}
