//! CORS layers for every gateway response
//!
//! `CorsLayer` answers every `OPTIONS` request as a preflight and sets the
//! origin and `Vary` headers on other responses. Browsers only read the
//! methods, headers and max-age values on preflight, but the gateway sends
//! them on every response, so they are added with `if_not_present` layers.

use crate::config::CorsConfig;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_MAX_AGE,
};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::warn;

/// CORS layer plus the header values repeated on non-preflight responses
#[derive(Clone)]
pub struct CorsLayers {
    cors: CorsLayer,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

impl CorsLayers {
    /// Build the layers from configuration
    pub fn from_config(config: &CorsConfig) -> anyhow::Result<Self> {
        let allow_origin = if config.allowed_origins.iter().any(|o| o == "*") {
            warn!(
                "CORS is configured with allowed_origins=['*']. \
                 Consider listing explicit origins for production deployments."
            );
            AllowOrigin::any()
        } else {
            let origins = config
                .allowed_origins
                .iter()
                .map(|o| HeaderValue::from_str(o))
                .collect::<Result<Vec<_>, _>>()?;
            AllowOrigin::list(origins)
        };

        let (allow_methods, methods_value) = if config.allowed_methods.iter().any(|m| m == "*") {
            (AllowMethods::from(Any), HeaderValue::from_static("*"))
        } else {
            let methods = config
                .allowed_methods
                .iter()
                .map(|m| m.parse::<Method>())
                .collect::<Result<Vec<_>, _>>()?;
            let value = join_header_values(methods.iter().map(Method::as_str))?;
            (AllowMethods::list(methods), value)
        };

        let (allow_headers, headers_value) = if config.allowed_headers.iter().any(|h| h == "*") {
            (AllowHeaders::from(Any), HeaderValue::from_static("*"))
        } else {
            let headers = config
                .allowed_headers
                .iter()
                .map(|h| h.parse::<HeaderName>())
                .collect::<Result<Vec<_>, _>>()?;
            let value = join_header_values(headers.iter().map(HeaderName::as_str))?;
            (AllowHeaders::list(headers), value)
        };

        let cors = CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(allow_methods)
            .allow_headers(allow_headers)
            .max_age(Duration::from_secs(config.max_age_secs));

        Ok(Self {
            cors,
            allow_methods: methods_value,
            allow_headers: headers_value,
            max_age: HeaderValue::from(config.max_age_secs),
        })
    }

    /// Wrap a router so every response carries the CORS headers
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .layer(self.cors.clone())
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_ALLOW_METHODS,
                self.allow_methods.clone(),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_ALLOW_HEADERS,
                self.allow_headers.clone(),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_MAX_AGE,
                self.max_age.clone(),
            ))
    }
}

/// Comma-join values the way `CorsLayer` renders its preflight lists
fn join_header_values<'a>(values: impl Iterator<Item = &'a str>) -> anyhow::Result<HeaderValue> {
    let joined = values.collect::<Vec<_>>().join(",");
    Ok(HeaderValue::from_str(&joined)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    fn config(origins: &[&str]) -> CorsConfig {
        CorsConfig {
            allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
            ..CorsConfig::default()
        }
    }

    fn app(config: &CorsConfig) -> Router {
        let layers = CorsLayers::from_config(config).unwrap();
        layers.apply(Router::new().route("/", get(|| async { "ok" })))
    }

    async fn call(app: Router, method: &str, origin: Option<&str>) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri("/");
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_joined_values_match_layer_format() {
        let layers = CorsLayers::from_config(&CorsConfig::default()).unwrap();
        assert_eq!(layers.allow_methods, "GET,OPTIONS");
        assert_eq!(layers.allow_headers, "content-type");
        assert_eq!(layers.max_age, "86400");
    }

    #[test]
    fn test_invalid_method_rejected() {
        let config = CorsConfig {
            allowed_methods: vec!["GET POST".to_string()],
            ..CorsConfig::default()
        };
        assert!(CorsLayers::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_preflight_without_origin() {
        let response = call(app(&CorsConfig::default()), "OPTIONS", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET,OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "content-type");
        assert_eq!(headers["access-control-max-age"], "86400");
    }

    #[tokio::test]
    async fn test_regular_response_carries_all_headers() {
        let response = call(app(&CorsConfig::default()), "GET", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET,OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "content-type");
        assert_eq!(headers["access-control-max-age"], "86400");
    }

    #[tokio::test]
    async fn test_allow_list_echoes_known_origin() {
        let config = config(&["https://shop.example.com"]);
        let response = call(app(&config), "GET", Some("https://shop.example.com")).await;

        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "https://shop.example.com");
        assert!(headers["vary"].to_str().unwrap().contains("origin"));
    }

    #[tokio::test]
    async fn test_allow_list_omits_unknown_origin() {
        let config = config(&["https://shop.example.com"]);
        let response = call(app(&config), "OPTIONS", Some("https://evil.example.com")).await;

        let headers = response.headers();
        assert!(headers.get("access-control-allow-origin").is_none());
        assert!(headers.get("access-control-allow-methods").is_some());
        assert!(headers.get("access-control-max-age").is_some());
    }

    #[tokio::test]
    async fn test_wildcard_in_list_wins() {
        let config = config(&["https://shop.example.com", "*"]);
        let response = call(app(&config), "GET", Some("https://other.example.com")).await;
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
