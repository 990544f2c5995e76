//! License Gateway - a narrow license validation proxy
//!
//! Accepts `GET ?license=..&product=..`, validates the query, forwards it to a
//! fixed upstream verification endpoint with a bounded timeout, and returns
//! the upstream verdict (or a JSON error) with CORS headers on every response.
//! Also provides:
//! - Prometheus metrics
//! - Health checks

pub mod config;
pub mod cors;
pub mod error;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod server;

pub use config::{ErrorStatusPolicy, GatewayConfig};
pub use error::GatewayError;
pub use gateway::{InboundQuery, ValidationGateway};
