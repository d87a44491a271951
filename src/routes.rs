//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets and echoes X-Request-Id
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← Span per request, carrying the ID
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 (search and echo routes only)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Bearer Auth     │ ← 401 (/api/search only)
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/login` - Never limited, never authenticated
//! - `/search`, `/vulnerable`, `/echo` - Rate limited
//! - `/api/search` - Rate limited, then authenticated

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{
    BearerAuth, ClientKeyExtractor, RateLimitLayer, TrustedProxies, make_request_span,
    propagate_request_id_layer, set_request_id_layer,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// - **Rate Limiting**: Enabled if `rate_limit_max_requests > 0`
/// - **Public Search**: `/search` exists only if `public_search` is set
/// - **CORS**: Configured from `cors_allowed_origins`
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let keys = ClientKeyExtractor::new(
        config.rate_limit_key,
        TrustedProxies::new(&config.trusted_proxies),
    );

    // Token-protected search
    let auth = BearerAuth::new(
        state.tokens.clone(),
        keys.clone(),
        state.auth_failures.clone(),
    );
    let protected = Router::new()
        .route("/api/search", get(handlers::search_books))
        .route_layer(auth);

    // Everything the rate limiter covers
    let mut limited = Router::new()
        .route("/vulnerable", get(handlers::echo_message))
        .route("/echo", get(handlers::echo_message))
        .merge(protected);

    if config.public_search {
        limited = limited.route("/search", get(handlers::search_books));
    } else {
        info!("Public /search disabled (PUBLIC_SEARCH=false)");
    }

    if config.rate_limiting_enabled() {
        info!(
            max_requests = config.rate_limit_max_requests,
            window_secs = config.rate_limit_window.as_secs(),
            key = %config.rate_limit_key,
            trusted_proxies = keys.trusted_proxies().len(),
            "Rate limiting enabled"
        );
        limited = limited.route_layer(RateLimitLayer::new(state.rate_limiter.clone(), keys));
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_MAX_REQUESTS=0)");
    }

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/login", get(handlers::login))
        .merge(limited)
        .layer(build_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
        .with_state(state)
}

/// Build CORS layer from configuration.
///
/// `*` allows any origin; otherwise unparseable origins are dropped. Every
/// route is `GET`, so that is the only method allowed.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if allow_any {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
