//! Configuration module for the license gateway
//!
//! Configuration is loaded from a TOML file (every section is optional) and
//! then overridden from `LICENSE_GATEWAY_*` environment variables.

use axum::http::{HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "LICENSE_GATEWAY_";

/// Default upstream verification endpoint
pub const DEFAULT_UPSTREAM_URL: &str = "https://bmsutilities.com/Registrations2/ValidateLicense";

/// How non-2xx upstream statuses are reported to the client
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatusPolicy {
    /// Return the upstream status with "License verification failed"
    #[default]
    Passthrough,
    /// Always return 500 with "Verification failed"
    #[serde(rename = "fixed500")]
    Fixed500,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream verification endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL; `License` and `Product` are appended as query parameters
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for the whole outbound call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// User-Agent sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Reporting of upstream error statuses
    #[serde(default)]
    pub error_status_policy: ErrorStatusPolicy,
    /// Largest upstream body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_base_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_user_agent() -> String {
    concat!("license-gateway/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            error_status_policy: ErrorStatusPolicy::default(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Inbound query validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum license length after trimming (0 disables the check)
    #[serde(default = "default_min_license_length")]
    pub min_license_length: usize,
}

fn default_min_license_length() -> usize {
    5
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_license_length: default_min_license_length(),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Methods announced to browsers; `"*"` allows any
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,
    /// Request headers announced to browsers; `"*"` allows any
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,
    /// Preflight cache duration in seconds
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allowed_methods() -> Vec<String> {
    vec!["GET".to_string(), "OPTIONS".to_string()]
}

fn default_allowed_headers() -> Vec<String> {
    vec!["Content-Type".to_string()]
}

fn default_max_age_secs() -> u64 {
    86_400
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path to expose metrics
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Whether health check is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path for health check endpoint
    #[serde(default = "default_health_path")]
    pub path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_health_path(),
        }
    }
}

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let config: GatewayConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply environment overrides
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => GatewayConfig::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file without validating it
    fn read_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Apply `LICENSE_GATEWAY_*` overrides using the given variable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(host) = var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {}PORT '{}': {}", ENV_PREFIX, port, e))?;
        }
        if let Some(url) = var("UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Some(timeout) = var("TIMEOUT_MS") {
            self.upstream.timeout_ms = timeout.parse().map_err(|e| {
                anyhow::anyhow!("Invalid {}TIMEOUT_MS '{}': {}", ENV_PREFIX, timeout, e)
            })?;
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(min) = var("MIN_LICENSE_LENGTH") {
            self.validation.min_license_length = min.parse().map_err(|e| {
                anyhow::anyhow!("Invalid {}MIN_LICENSE_LENGTH '{}': {}", ENV_PREFIX, min, e)
            })?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let base = url::Url::parse(&self.upstream.base_url).map_err(|e| {
            anyhow::anyhow!("Invalid upstream base_url '{}': {}", self.upstream.base_url, e)
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!(
                "Upstream base_url must use http or https, got '{}'",
                base.scheme()
            );
        }

        if self.upstream.timeout_ms == 0 {
            anyhow::bail!("Upstream timeout_ms must be greater than zero");
        }
        if self.upstream.max_body_bytes == 0 {
            anyhow::bail!("Upstream max_body_bytes must be greater than zero");
        }

        if HeaderValue::from_str(&self.upstream.user_agent).is_err() {
            anyhow::bail!("Upstream user_agent is not a valid header value");
        }

        if self.cors.allowed_origins.is_empty() {
            anyhow::bail!("CORS allowed_origins must contain at least one origin (or \"*\")");
        }
        for origin in &self.cors.allowed_origins {
            if HeaderValue::from_str(origin).is_err() {
                anyhow::bail!("CORS origin '{}' is not a valid header value", origin);
            }
        }
        for method in &self.cors.allowed_methods {
            if method != "*" && method.parse::<Method>().is_err() {
                anyhow::bail!("CORS method '{}' is not a valid HTTP method", method);
            }
        }
        for header in &self.cors.allowed_headers {
            if header != "*" && header.parse::<HeaderName>().is_err() {
                anyhow::bail!("CORS header '{}' is not a valid header name", header);
            }
        }

        if self.health.enabled && !self.health.path.starts_with('/') {
            anyhow::bail!("Health path '{}' must start with '/'", self.health.path);
        }
        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            anyhow::bail!("Metrics path '{}' must start with '/'", self.metrics.path);
        }
        if self.health.enabled && self.metrics.enabled && self.health.path == self.metrics.path {
            anyhow::bail!(
                "Health and metrics endpoints cannot share the path '{}'",
                self.health.path
            );
        }

        Ok(())
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
