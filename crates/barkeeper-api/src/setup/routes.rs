//! Route and layer setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use barkeeper_core::Config;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health::health_check, uploads::accept_uploads};
use crate::middleware::upload_middleware;
use crate::state::AppState;

/// Extra bytes allowed past the multipart body cap, so the parser's own
/// limit is the one that fires and reports which part overflowed.
const BODY_LIMIT_HEADROOM: u64 = 64 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router {
    let cors = setup_cors(config);

    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
        .max(1);
    tracing::info!(http_concurrency_limit, "HTTP concurrency limit layer enabled");

    let body_limit = config
        .parser_limits()
        .max_body_size_bytes
        .saturating_add(BODY_LIMIT_HEADROOM);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let upload_routes = Router::new().route(
        "/uploads",
        post(accept_uploads).layer(axum::middleware::from_fn_with_state(
            state.uploads.clone(),
            upload_middleware,
        )),
    );

    Router::new()
        .route("/health", get(health_check))
        .merge(upload_routes)
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn setup_cors(config: &Config) -> CorsLayer {
    if config.cors_origins().iter().any(|o| o == "*") {
        if config.is_production() {
            tracing::warn!("CORS configured to allow all origins - not recommended for production");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins()
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    }
}
