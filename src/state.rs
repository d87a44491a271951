//! Shared application state for Axum handlers.
//!
//! - **Catalog**: Pooled client for the upstream author search
//! - **Tokens**: Signing and verification keys
//! - **Rate Limiter**: Per-client request counter shared with the middleware
//! - **Auth Failures**: Per-client quota for bad tokens, shared with the auth layer
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! A maintenance task evicts expired rate limit windows and idle auth
//! failure entries, so neither table grows with the number of distinct
//! clients ever seen. It is owned by a `tokio_util::task::TaskTracker` and
//! stopped through a `CancellationToken`. Call `shutdown()` before exit to
//! wait for it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::metrics;
use crate::middleware::RequestCounter;
use crate::middleware::auth::{AuthFailureLimiter, auth_failure_limiter, sweep_auth_failures};
use crate::tokens::TokenService;

/// Sweep interval when counts never reset or rate limiting is off.
///
/// Matches the auth failure quota's one-minute period.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Upstream catalog client
    pub catalog: CatalogClient,
    /// Token signing and verification
    pub tokens: TokenService,
    /// Request counter used by the rate limit layer
    pub rate_limiter: RequestCounter,
    /// Bad-token quota used by the bearer auth layer
    pub auth_failures: Arc<AuthFailureLimiter>,
    /// Application configuration
    pub config: Arc<Config>,
    /// When the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build state from configuration.
    ///
    /// Spawns the maintenance task, which sweeps once per rate limit window
    /// (or once a minute without one). Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog client cannot be built.
    pub fn new(config: Config) -> AppResult<Self> {
        let catalog = CatalogClient::new(&config)?;
        let tokens = TokenService::new(&config);
        let rate_limiter =
            RequestCounter::new(config.rate_limit_max_requests, config.rate_limit_window());
        let auth_failures = Arc::new(auth_failure_limiter(
            config.auth_failure_limit,
            config.auth_failure_burst,
        ));

        let state = Self {
            catalog,
            tokens,
            rate_limiter,
            auth_failures,
            config: Arc::new(config),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        let period = if state.config.rate_limiting_enabled() {
            state.config.rate_limit_window()
        } else {
            None
        };
        state.spawn_maintenance_task(period.unwrap_or(DEFAULT_SWEEP_INTERVAL));

        Ok(state)
    }

    /// Periodically drop expired rate limit windows and idle auth failure
    /// entries.
    fn spawn_maintenance_task(&self, period: Duration) {
        let counter = self.rate_limiter.clone();
        let auth_failures = self.auth_failures.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Maintenance task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = counter.evict_expired().await;
                        let auth_clients = sweep_auth_failures(&auth_failures);
                        metrics::set_auth_failure_tracked_clients(auth_clients);
                        trace!(evicted, auth_clients, "Client tables swept");
                    }
                }
            }

            debug!("Maintenance task shutting down");
        });
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_and_shutdown() {
        let state = AppState::new(Config::default()).unwrap();
        assert_eq!(state.uptime_seconds(), 0);

        tokio::time::timeout(Duration::from_secs(5), state.shutdown())
            .await
            .expect("shutdown should complete");
    }

    #[tokio::test]
    async fn test_no_eviction_task_without_window() {
        let config = Config {
            rate_limit_window: Duration::ZERO,
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();
        assert!(state.rate_limiter.window().is_none());
        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_task_sweeps_expired_entries() {
        let config = Config {
            rate_limit_window: Duration::from_secs(10),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();
        state.rate_limiter.check("client").await;
        assert_eq!(state.rate_limiter.tracked_clients().await, 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(state.rate_limiter.tracked_clients().await, 0);

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_task_sweeps_auth_failures() {
        // 60_000/min replenishes one failure per millisecond
        let config = Config {
            auth_failure_limit: 60_000,
            rate_limit_window: Duration::from_secs(10),
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();

        for i in 0..500 {
            let _ = state.auth_failures.check_key(&format!("198.51.100.{i}"));
        }
        assert_eq!(state.auth_failures.len(), 500);

        // The limiter runs on a real clock; paused tokio time drives the ticker
        std::thread::sleep(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert!(state.auth_failures.is_empty());
        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failures_swept_without_rate_limiting() {
        let config = Config {
            auth_failure_limit: 60_000,
            rate_limit_max_requests: 0,
            ..Config::default()
        };
        let state = AppState::new(config).unwrap();
        let _ = state.auth_failures.check_key(&"203.0.113.5".to_string());

        std::thread::sleep(Duration::from_millis(20));
        tokio::time::sleep(DEFAULT_SWEEP_INTERVAL + Duration::from_secs(1)).await;

        assert!(state.auth_failures.is_empty());
        state.shutdown().await;
    }
}
