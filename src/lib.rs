//! # Book Search Service
//!
//! HTTP front end for a third-party book catalog, featuring:
//!
//! - **Search**: Author lookup against an upstream JSON catalog
//! - **Tokens**: Signed, expiring bearer tokens issued by `/login`
//! - **Abuse Control**: Per-client fixed-window rate limiting and brute
//!   force metering of failed token checks
//! - **Observability**: Request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Trace → Rate Limit → Bearer Auth) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (search, login, echo, health)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CatalogClient (pooled reqwest client, bounded timeouts)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Upstream catalog (GET ?author=...)                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use book_search::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! Use a stable signing secret so tokens survive restarts:
//! ```bash
//! JWT_SECRET=at-least-sixteen-bytes cargo run
//! ```
//!
//! Tune rate limiting:
//! ```bash
//! RATE_LIMIT_MAX_REQUESTS=100 RATE_LIMIT_WINDOW_SECS=60 cargo run
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod tokens;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use catalog::CatalogClient;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
pub use tokens::TokenService;
