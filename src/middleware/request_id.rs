//! Request ID generation and propagation.
//!
//! Built on `tower-http`'s request-id layers:
//!
//! 1. [`set_request_id_layer`] keeps an incoming `X-Request-Id` or generates a UUIDv4
//! 2. [`make_request_span`] puts that ID on the `TraceLayer` span
//! 3. [`propagate_request_id_layer`] copies it onto the response
//!
//! Clients can supply their own ID for correlation:
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" "http://localhost:8080/search?author=tolkien"
//! ```

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::{Span, info_span};
use uuid::Uuid;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generates UUIDv4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer that assigns an ID to requests arriving without one.
pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), UuidRequestId)
}

/// Layer that echoes the request ID on the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER))
}

/// Span for `TraceLayer::make_span_with`, carrying the request ID.
pub fn make_request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri().path(),
        request_id = %request_id,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_uuid() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let id = UuidRequestId.make_request_id(&req).unwrap();
        let value = id.header_value().to_str().unwrap();

        assert!(Uuid::parse_str(value).is_ok());
    }

    #[test]
    fn test_generated_ids_differ() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let mut make = UuidRequestId;

        let a = make.make_request_id(&req).unwrap();
        let b = make.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }

    #[test]
    fn test_span_without_request_id() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let _span = make_request_span(&req);
    }
}
