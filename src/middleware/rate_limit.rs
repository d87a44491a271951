//! Per-client request counting with a fixed window.
//!
//! # Algorithm
//!
//! Each client key owns a counter and the instant its window started:
//!
//! 1. If the window has elapsed, the counter restarts at zero
//! 2. If the counter is at the ceiling, the request is rejected (not counted)
//! 3. Otherwise the counter is incremented and the request proceeds
//!
//! Steps 1-3 run under a single lock, so concurrent requests from one client
//! cannot over- or under-count. Without a window (`None`) counters never
//! reset: a client is blocked for the life of the process after reaching the
//! ceiling.
//!
//! # Eviction
//!
//! Expired entries are reset lazily on access and removed in bulk by
//! [`RequestCounter::evict_expired`], which `AppState` runs on a background
//! task once per window.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Seconds until the window resets (omitted without a window)
//! - `X-RateLimit-Limit`: Configured ceiling
//! - `X-RateLimit-Remaining`: Always `0`

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::ClientKeyExtractor;
use crate::error::ErrorResponse;
use crate::metrics;

/// Message returned with every 429 from the request counter.
pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests";

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    window_started: Instant,
}

/// Outcome of [`RequestCounter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted; `remaining` more are allowed in this window.
    Allowed { remaining: u32 },
    /// Request rejected. `retry_after` is `None` when counts never reset.
    Limited { retry_after: Option<Duration> },
}

/// Concurrency-safe per-client request counter.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct RequestCounter {
    entries: Arc<Mutex<HashMap<String, WindowEntry>>>,
    max_requests: u32,
    window: Option<Duration>,
}

impl RequestCounter {
    /// Create a counter admitting `max_requests` per client per `window`.
    pub fn new(max_requests: u32, window: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Option<Duration> {
        self.window
    }

    /// Count a request for `key`, or reject it if the ceiling is reached.
    pub async fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            window_started: now,
        });

        if let Some(window) = self.window
            && now.duration_since(entry.window_started) >= window
        {
            entry.count = 0;
            entry.window_started = now;
        }

        if entry.count >= self.max_requests {
            let retry_after = self.window.map(|window| {
                let elapsed = now.duration_since(entry.window_started);
                window.saturating_sub(elapsed)
            });
            return Decision::Limited { retry_after };
        }

        entry.count += 1;
        Decision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }

    /// Current count for `key` within its window (0 if unknown or expired).
    pub async fn count(&self, key: &str) -> u32 {
        let entries = self.entries.lock().await;
        match (entries.get(key), self.window) {
            (Some(entry), Some(window)) if entry.window_started.elapsed() >= window => 0,
            (Some(entry), _) => entry.count,
            (None, _) => 0,
        }
    }

    /// Drop entries whose window has elapsed. Returns how many were removed.
    ///
    /// A no-op when counts never reset.
    pub async fn evict_expired(&self) -> usize {
        let Some(window) = self.window else {
            return 0;
        };

        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.window_started) < window);
        let evicted = before - entries.len();

        metrics::set_rate_limit_tracked_clients(entries.len());
        evicted
    }

    /// Number of client keys currently held.
    pub async fn tracked_clients(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let counter = RequestCounter::new(10, Some(Duration::from_secs(60)));
/// let app = Router::new()
///     .route("/search", get(handler))
///     .route_layer(RateLimitLayer::new(counter, ClientKeyExtractor::default()));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    counter: RequestCounter,
    keys: Arc<ClientKeyExtractor>,
}

impl RateLimitLayer {
    pub fn new(counter: RequestCounter, keys: ClientKeyExtractor) -> Self {
        Self {
            counter,
            keys: Arc::new(keys),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            counter: self.counter.clone(),
            keys: self.keys.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    counter: RequestCounter,
    keys: Arc<ClientKeyExtractor>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let counter = self.counter.clone();
        let client_key = self.keys.key_for(&req).into_owned();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match counter.check(&client_key).await {
                Decision::Allowed { remaining } => {
                    debug!(client_key = %client_key, remaining, "Request admitted");
                    inner.call(req).await
                }
                Decision::Limited { retry_after } => {
                    warn!(
                        client_key = %client_key,
                        path = %req.uri().path(),
                        retry_after_secs = retry_after.map(|d| d.as_secs()),
                        "Rate limit exceeded"
                    );
                    metrics::record_rate_limited();
                    Ok(too_many_requests(counter.max_requests(), retry_after))
                }
            }
        })
    }
}

/// Build the 429 response with rate limit headers.
fn too_many_requests(limit: u32, retry_after: Option<Duration>) -> Response<Body> {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("X-RateLimit-Limit", limit.to_string()),
            ("X-RateLimit-Remaining", "0".to_string()),
        ],
        axum::Json(ErrorResponse::new(
            "too_many_requests",
            TOO_MANY_REQUESTS_MESSAGE,
        )),
    )
        .into_response();

    if let Some(wait) = retry_after {
        // Round up so clients never retry a moment too early
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, secs.max(1).into());
    }

    response
}
