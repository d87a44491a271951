//! Client-specified upstream timeout.
//!
//! A client may ask for a shorter upstream timeout with:
//!
//! ```text
//! X-Request-Timeout: 5000  # milliseconds
//! ```
//!
//! Handlers take [`RequestTimeout`] as an extractor. Values outside
//! `MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS`, or that do not parse,
//! are ignored. The catalog client clamps the result to its configured
//! timeout, so the header can never lengthen it.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use tracing::debug;

/// Minimum accepted value (100ms).
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

/// Maximum accepted value (5 minutes).
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;

/// Header name for client-specified request timeout.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout";

/// The timeout a client asked for, if it asked for a usable one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestTimeout(pub Option<Duration>);

impl RequestTimeout {
    /// Accept `ms` only within the allowed range.
    pub fn from_millis(ms: u64) -> Option<Duration> {
        (MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS)
            .contains(&ms)
            .then(|| Duration::from_millis(ms))
    }

    /// Read the timeout header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(raw) = headers.get(REQUEST_TIMEOUT_HEADER) else {
            return Self(None);
        };

        let Some(ms) = raw.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok()) else {
            debug!("Invalid X-Request-Timeout header value, ignoring");
            return Self(None);
        };

        match Self::from_millis(ms) {
            Some(duration) => {
                debug!(timeout_ms = ms, "Client specified request timeout via header");
                Self(Some(duration))
            }
            None => {
                debug!(
                    timeout_ms = ms,
                    min = MIN_REQUEST_TIMEOUT_MS,
                    max = MAX_REQUEST_TIMEOUT_MS,
                    "Client timeout outside allowed range, ignoring"
                );
                Self(None)
            }
        }
    }
}

impl<S> FromRequestParts<S> for RequestTimeout
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
