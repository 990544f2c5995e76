//! HTTP server wiring
//!
//! The gateway is the fallback route, so it answers on any path. Health and
//! metrics endpoints are mounted in front of it when enabled and hand every
//! other method back to the gateway. The CORS layers wrap everything.

use crate::config::GatewayConfig;
use crate::cors::CorsLayers;
use crate::gateway::ValidationGateway;
use crate::health::HealthChecker;
use crate::metrics::GatewayMetrics;
use axum::extract::{RawQuery, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ValidationGateway>,
    pub metrics: Arc<GatewayMetrics>,
    pub health: Arc<HealthChecker>,
    pub cors: CorsLayers,
}

impl AppState {
    /// Build all shared components from configuration
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(GatewayMetrics::new());
        let gateway = Arc::new(ValidationGateway::new(config, metrics.clone())?);

        Ok(Self {
            gateway,
            metrics,
            health: Arc::new(HealthChecker::new()),
            cors: CorsLayers::from_config(&config.cors)?,
        })
    }
}

/// Build the router for the given configuration and state
pub fn build_router(config: &GatewayConfig, state: AppState) -> Router {
    let mut router = Router::new();

    if config.health.enabled {
        router = router.route(
            &config.health.path,
            get(health_handler).fallback(gateway_handler),
        );
    }
    if config.metrics.enabled {
        router = router.route(
            &config.metrics.path,
            get(metrics_handler).fallback(gateway_handler),
        );
    }

    let router = state.cors.apply(router.fallback(gateway_handler));

    router
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            record_preflight,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Count preflight requests, which the CORS layer answers before any handler
async fn record_preflight(
    State(metrics): State<Arc<GatewayMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let is_preflight = request.method() == Method::OPTIONS;
    let response = next.run(request).await;
    if is_preflight {
        metrics.record_request(
            Method::OPTIONS.as_str(),
            "preflight",
            response.status().as_u16(),
        );
    }
    response
}

/// Bind and serve until the process is stopped
pub async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let app = build_router(&config, state);

    if config.health.enabled {
        info!("Health endpoint enabled at {}", config.health.path);
    }
    if config.metrics.enabled {
        info!("Metrics endpoint enabled at {}", config.metrics.path);
    }

    let addr: SocketAddr = config.server_addr().parse()?;
    info!("Starting license gateway on {}", addr);
    info!(
        "Upstream: {} (timeout {}ms, policy {:?})",
        config.upstream.base_url, config.upstream.timeout_ms, config.upstream.error_status_policy
    );
    info!("CORS origins: {}", config.cors.allowed_origins.join(", "));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health.liveness()))
}

/// Metrics handler
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.prometheus_output() {
        Ok(output) => (StatusCode::OK, output).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Gateway handler - validates and forwards license queries
async fn gateway_handler(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Response {
    state.gateway.handle(&method, query.as_deref()).await
}
