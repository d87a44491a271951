//! HTTP middleware for access control and observability.
//!
//! - **Rate Limiting**: Fixed-window request counter per client key
//! - **Bearer Authentication**: Signed, expiring tokens with brute force metering
//! - **Client Keys**: Peer address extraction with trusted proxy support
//! - **Request ID**: Generation and propagation for tracing
//! - **Request Timeout**: Client-shortened upstream timeout
//!
//! # Architecture
//!
//! ```text
//! Request → Request ID → Trace → CORS → Rate Limiter → Bearer Auth → Handler
//!                                            ↓              ↓
//!                                      429 Too Many    401 Unauthorized
//! ```
//!
//! The rate limiter sits outside authentication, so requests with bad
//! tokens still count against the client's ceiling.

pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod request_id;
pub mod timeout;

pub use auth::{AuthenticatedUser, BearerAuth};
pub use ip::{ClientKeyExtractor, TrustedProxies, UNKNOWN_IP};
pub use rate_limit::{Decision, RateLimitLayer, RequestCounter};
pub use request_id::{make_request_span, propagate_request_id_layer, set_request_id_layer};
pub use timeout::RequestTimeout;
