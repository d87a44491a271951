//! Bearer token authentication middleware.
//!
//! # Protocol
//!
//! Protected routes require:
//!
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! The token must carry a valid HS256 signature, an unexpired `exp`, and the
//! configured `iss` (see [`crate::tokens`]).
//!
//! # Rejections (401)
//!
//! - No header: `Missing Authorization header`
//! - Anything but exactly `Bearer <token>`: `Invalid Authorization header format`
//! - Verification failure: `Invalid token`
//!
//! # Brute Force Protection
//!
//! Tokens that fail verification are metered per client key with a GCRA
//! quota. Once a client exhausts it, further bad tokens get 429 with
//! `Retry-After` instead of 401. A missing or malformed header is always
//! 401 and never consumes quota, and a valid token is never blocked.
//!
//! The limiter lives in `AppState`, whose maintenance task drops idle keys
//! with [`sweep_auth_failures`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::ClientKeyExtractor;
use crate::error::ErrorResponse;
use crate::metrics;
use crate::tokens::TokenService;

pub const MISSING_HEADER_MESSAGE: &str = "Missing Authorization header";
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid Authorization header format";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token";

/// Floor for the failure quota's rate and burst.
const MIN_QUOTA: NonZeroU32 = NonZeroU32::MIN;

/// Per-client limiter for failed verifications.
pub type AuthFailureLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Build the failure limiter.
///
/// `failures_per_minute` is the sustained rate of tolerated bad tokens per
/// client, `failure_burst` how many may arrive back to back. Zero for
/// either value is raised to 1.
pub fn auth_failure_limiter(failures_per_minute: u32, failure_burst: u32) -> AuthFailureLimiter {
    let rate = NonZeroU32::new(failures_per_minute).unwrap_or(MIN_QUOTA);
    let burst = NonZeroU32::new(failure_burst).unwrap_or(MIN_QUOTA);
    RateLimiter::keyed(Quota::per_minute(rate).allow_burst(burst))
}

/// Drop clients whose failure history has fully replenished.
///
/// Returns the number of keys still held.
pub fn sweep_auth_failures<C>(
    limiter: &RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>,
) -> usize
where
    C: Clock,
{
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

/// The verified caller, inserted into request extensions on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Why a request was rejected, before it is turned into a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthFailure {
    MissingHeader,
    InvalidFormat,
    InvalidToken,
}

impl AuthFailure {
    fn message(self) -> &'static str {
        match self {
            Self::MissingHeader => MISSING_HEADER_MESSAGE,
            Self::InvalidFormat => INVALID_FORMAT_MESSAGE,
            Self::InvalidToken => INVALID_TOKEN_MESSAGE,
        }
    }

    fn metric_reason(self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::InvalidFormat => "invalid_format",
            Self::InvalidToken => "invalid_token",
        }
    }
}

/// Bearer token authentication layer.
#[derive(Clone)]
pub struct BearerAuth {
    tokens: TokenService,
    keys: Arc<ClientKeyExtractor>,
    failure_limiter: Arc<AuthFailureLimiter>,
}

impl BearerAuth {
    /// Create a bearer auth layer.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Verifies presented tokens
    /// * `keys` - Identifies clients for failure tracking
    /// * `failure_limiter` - Shared per-client quota for bad tokens
    pub fn new(
        tokens: TokenService,
        keys: ClientKeyExtractor,
        failure_limiter: Arc<AuthFailureLimiter>,
    ) -> Self {
        Self {
            tokens,
            keys: Arc::new(keys),
            failure_limiter,
        }
    }
}

impl<S> Layer<S> for BearerAuth {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            tokens: self.tokens.clone(),
            keys: self.keys.clone(),
            failure_limiter: self.failure_limiter.clone(),
        }
    }
}

/// Bearer token authentication service wrapper.
#[derive(Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    tokens: TokenService,
    keys: Arc<ClientKeyExtractor>,
    failure_limiter: Arc<AuthFailureLimiter>,
}

impl<S> Service<Request<Body>> for BearerAuthService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let verdict = bearer_token(&req).and_then(|token| {
            self.tokens.verify(token).map_err(|e| {
                debug!(error = %e, "Token verification failed");
                AuthFailure::InvalidToken
            })
        });

        let failure = match verdict {
            Ok(claims) => {
                debug!(username = %claims.username, "Bearer authentication successful");
                req.extensions_mut().insert(AuthenticatedUser {
                    username: claims.username,
                });
                let mut inner = self.inner.clone();
                return Box::pin(async move { inner.call(req).await });
            }
            Err(failure) => failure,
        };

        let client_key = self.keys.key_for(&req).into_owned();
        metrics::record_auth_failure(failure.metric_reason());

        // Only bad tokens consume quota; header problems are always 401
        let metered = match failure {
            AuthFailure::InvalidToken => self.failure_limiter.check_key(&client_key),
            AuthFailure::MissingHeader | AuthFailure::InvalidFormat => Ok(()),
        };

        let response = match metered {
            Ok(()) => {
                warn!(
                    path = %req.uri().path(),
                    client_key = %client_key,
                    reason = failure.metric_reason(),
                    "Rejected unauthenticated request"
                );
                unauthorized_response(failure.message())
            }
            Err(not_until) => {
                let wait_time = not_until.wait_time_from(DefaultClock::default().now());
                let retry_after = wait_time.as_secs().max(1);
                warn!(
                    client_key = %client_key,
                    retry_after_secs = retry_after,
                    "Client blocked due to excessive auth failures"
                );
                rate_limited_response(retry_after)
            }
        };

        Box::pin(async move { Ok(response) })
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The header must split on single spaces into exactly two parts, the first
/// being the literal `Bearer`.
fn bearer_token<B>(req: &Request<B>) -> Result<&str, AuthFailure> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthFailure::MissingHeader)?;

    let value = value.to_str().map_err(|_| AuthFailure::InvalidFormat)?;
    if value.is_empty() {
        return Err(AuthFailure::MissingHeader);
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthFailure::InvalidFormat),
    }
}

/// Build an unauthorized (401) response.
fn unauthorized_response(message: &str) -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        axum::Json(ErrorResponse::new("unauthorized", message)),
    )
        .into_response()
}

/// Build a rate limited (429) response for auth failures.
fn rate_limited_response(retry_after: u64) -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        axum::Json(ErrorResponse::new(
            "too_many_requests",
            "Too many failed authentication attempts. Please wait before retrying.",
        )),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use governor::clock::FakeRelativeClock;

    fn request_with(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/search");
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token_extracted() {
        let req = request_with(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_missing() {
        let req = request_with(None);
        assert_eq!(bearer_token(&req), Err(AuthFailure::MissingHeader));

        let req = request_with(Some(""));
        assert_eq!(bearer_token(&req), Err(AuthFailure::MissingHeader));
    }

    #[test]
    fn test_bearer_token_bad_format() {
        for value in [
            "abc.def.ghi",
            "Basic dXNlcjpwYXNz",
            "bearer abc",
            "Bearer",
            "Bearer  abc",
            "Bearer abc extra",
        ] {
            let req = request_with(Some(value));
            assert_eq!(
                bearer_token(&req),
                Err(AuthFailure::InvalidFormat),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            AuthFailure::MissingHeader.message(),
            "Missing Authorization header"
        );
        assert_eq!(AuthFailure::InvalidToken.message(), "Invalid token");
    }

    #[test]
    fn test_unauthorized_response_shape() {
        let response = unauthorized_response(INVALID_TOKEN_MESSAGE);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn test_rate_limited_response_shape() {
        let response = rate_limited_response(7);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[test]
    fn test_zero_quota_is_raised_to_one() {
        let limiter = auth_failure_limiter(0, 0);
        assert!(limiter.check_key(&"client".to_string()).is_ok());
        assert!(limiter.check_key(&"client".to_string()).is_err());
    }

    #[test]
    fn test_sweep_drops_replenished_clients() {
        let clock = FakeRelativeClock::default();
        let quota = Quota::per_minute(NonZeroU32::new(10).unwrap())
            .allow_burst(NonZeroU32::new(5).unwrap());
        let limiter = RateLimiter::new(quota, DefaultKeyedStateStore::<String>::default(), clock.clone());

        for i in 0..1000 {
            limiter.check_key(&format!("10.0.{}.{}", i / 256, i % 256)).unwrap();
        }
        assert_eq!(sweep_auth_failures(&limiter), 1000);

        // One failure needs 6s to replenish at 10/min
        clock.advance(Duration::from_secs(7));
        assert_eq!(sweep_auth_failures(&limiter), 0);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_sweep_keeps_clients_still_penalized() {
        let clock = FakeRelativeClock::default();
        let quota = Quota::per_minute(NonZeroU32::new(10).unwrap());
        let limiter = RateLimiter::new(quota, DefaultKeyedStateStore::<String>::default(), clock.clone());

        limiter.check_key(&"recent".to_string()).unwrap();
        clock.advance(Duration::from_secs(3));
        assert_eq!(sweep_auth_failures(&limiter), 1);
    }
}
