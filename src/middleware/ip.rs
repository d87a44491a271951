//! Client key extraction shared by rate limiting and auth failure tracking.
//!
//! # Key Sources
//!
//! The key is derived from the TCP peer (Axum's `ConnectInfo<SocketAddr>`
//! extension, installed by `into_make_service_with_connect_info`):
//!
//! - [`RateLimitKey::Ip`]: the peer IP (`203.0.113.7`)
//! - [`RateLimitKey::PeerAddr`]: the raw socket address (`203.0.113.7:51234`)
//!
//! # Forwarded Headers
//!
//! `X-Forwarded-For` and `X-Real-IP` are honored **only** when the peer IP
//! is inside a configured trusted proxy range. Otherwise any client could
//! pick its own key and walk around the limiter. With no trusted proxies
//! configured, forwarded headers are never read.
//!
//! ## The "unknown" Fallback
//!
//! Requests without connection info (e.g. driven in-process through
//! `oneshot`) share the `"unknown"` key.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

use crate::config::RateLimitKey;

/// Fallback key when no client address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse CIDR notation (`10.0.0.0/8`, `::1/128`) or a bare IP
    /// (implicit `/32` or `/128`).
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = match cidr.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr.trim(), None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = if network.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix_len)).unwrap_or(0);
                (u32::from(net) & mask) == (u32::from(addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(net) & mask) == (u128::from(addr) & mask)
            }
            _ => false,
        }
    }
}

/// Networks whose forwarded headers are trusted.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    ranges: Vec<CidrRange>,
}

impl TrustedProxies {
    /// Parse CIDR strings; invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        Self { ranges }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether `ip` belongs to a trusted proxy. Always `false` when no
    /// ranges are configured.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Client Key Extraction
// =============================================================================

/// Derives the per-client key for a request.
#[derive(Debug, Clone, Default)]
pub struct ClientKeyExtractor {
    strategy: RateLimitKey,
    trusted_proxies: TrustedProxies,
}

impl ClientKeyExtractor {
    pub fn new(strategy: RateLimitKey, trusted_proxies: TrustedProxies) -> Self {
        Self {
            strategy,
            trusted_proxies,
        }
    }

    pub fn trusted_proxies(&self) -> &TrustedProxies {
        &self.trusted_proxies
    }

    /// Compute the client key.
    ///
    /// Returns `Cow::Borrowed("unknown")` when the request carries no
    /// connection info, so the common fallback does not allocate.
    pub fn key_for<B>(&self, req: &Request<B>) -> Cow<'static, str> {
        let Some(peer) = peer_addr(req) else {
            return Cow::Borrowed(UNKNOWN_IP);
        };

        if self.trusted_proxies.is_trusted(&peer.ip()) {
            if let Some(forwarded) = forwarded_ip(req) {
                debug!(peer = %peer, client_ip = %forwarded, "Using forwarded client IP from trusted proxy");
                return Cow::Owned(forwarded.to_string());
            }
            debug!(peer = %peer, "Trusted proxy sent no usable forwarded header");
        }

        match self.strategy {
            RateLimitKey::Ip => Cow::Owned(peer.ip().to_canonical().to_string()),
            RateLimitKey::PeerAddr => Cow::Owned(peer.to_string()),
        }
    }
}

/// Peer socket address recorded by `into_make_service_with_connect_info`.
fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// First valid IP in `X-Forwarded-For`, else `X-Real-IP`.
///
/// Values that do not parse as an IP are ignored rather than used as keys.
fn forwarded_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return Some(ip);
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && let Ok(ip) = value.trim().parse::<IpAddr>()
    {
        return Some(ip);
    }

    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_from(peer: &str) -> axum::http::request::Builder {
        let addr: SocketAddr = peer.parse().unwrap();
        let mut builder = Request::builder();
        builder
            .extensions_mut()
            .unwrap()
            .insert(ConnectInfo(addr));
        builder
    }

    fn extractor(strategy: RateLimitKey, proxies: &[&str]) -> ClientKeyExtractor {
        let proxies: Vec<String> = proxies.iter().map(|s| (*s).to_string()).collect();
        ClientKeyExtractor::new(strategy, TrustedProxies::new(&proxies))
    }

    #[test]
    fn test_key_is_peer_ip_by_default() {
        let req = request_from("192.168.1.1:50000").body(Body::empty()).unwrap();
        assert_eq!(extractor(RateLimitKey::Ip, &[]).key_for(&req), "192.168.1.1");
    }

    #[test]
    fn test_key_is_raw_socket_addr() {
        let req = request_from("192.168.1.1:50000").body(Body::empty()).unwrap();
        assert_eq!(
            extractor(RateLimitKey::PeerAddr, &[]).key_for(&req),
            "192.168.1.1:50000"
        );
    }

    #[test]
    fn test_key_unknown_without_connect_info() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let key = extractor(RateLimitKey::Ip, &[]).key_for(&req);
        assert_eq!(key, UNKNOWN_IP);
        assert!(matches!(key, Cow::Borrowed(_)));
    }

    #[test]
    fn test_forwarded_ignored_without_trusted_proxies() {
        let req = request_from("203.0.113.9:4000")
            .header("x-forwarded-for", "10.9.9.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extractor(RateLimitKey::Ip, &[]).key_for(&req), "203.0.113.9");
    }

    #[test]
    fn test_forwarded_used_from_trusted_proxy() {
        let req = request_from("10.0.0.5:4000")
            .header("x-forwarded-for", " 198.51.100.20 , 10.0.0.5")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extractor(RateLimitKey::Ip, &["10.0.0.0/8"]).key_for(&req),
            "198.51.100.20"
        );
    }

    #[test]
    fn test_forwarded_ignored_from_untrusted_peer() {
        let req = request_from("203.0.113.9:4000")
            .header("x-forwarded-for", "198.51.100.20")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extractor(RateLimitKey::Ip, &["10.0.0.0/8"]).key_for(&req),
            "203.0.113.9"
        );
    }

    #[test]
    fn test_real_ip_fallback_from_trusted_proxy() {
        let req = request_from("10.0.0.5:4000")
            .header("x-forwarded-for", "garbage")
            .header("x-real-ip", "198.51.100.21")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extractor(RateLimitKey::Ip, &["10.0.0.0/8"]).key_for(&req),
            "198.51.100.21"
        );
    }

    #[test]
    fn test_trusted_proxy_without_headers_uses_peer() {
        let req = request_from("10.0.0.5:4000").body(Body::empty()).unwrap();
        assert_eq!(
            extractor(RateLimitKey::PeerAddr, &["10.0.0.0/8"]).key_for(&req),
            "10.0.0.5:4000"
        );
    }

    #[test]
    fn test_ipv4_mapped_ipv6_peer_is_canonical() {
        let req = request_from("[::ffff:192.0.2.1]:8000")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extractor(RateLimitKey::Ip, &[]).key_for(&req), "192.0.2.1");
    }

    // ==========================================================================
    // CIDR Range Tests
    // ==========================================================================

    #[test]
    fn test_cidr_parse() {
        assert_eq!(CidrRange::parse("10.0.0.0/8").unwrap().prefix_len, 8);
        assert_eq!(CidrRange::parse("::1/128").unwrap().prefix_len, 128);
        assert_eq!(CidrRange::parse("192.168.1.1").unwrap().prefix_len, 32);
        assert_eq!(CidrRange::parse("0.0.0.0/0").unwrap().prefix_len, 0);
    }

    #[test]
    fn test_cidr_parse_invalid() {
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
        assert!(CidrRange::parse("10.0.0.0/x").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));

        let any = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(any.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxies_skip_invalid() {
        let proxies = TrustedProxies::new(&["10.0.0.0/8".to_string(), "bogus".to_string()]);
        assert_eq!(proxies.len(), 1);
        assert!(proxies.is_trusted(&"10.1.2.3".parse().unwrap()));
        assert!(!proxies.is_trusted(&"11.1.2.3".parse().unwrap()));

        assert!(!TrustedProxies::default().is_trusted(&"10.1.2.3".parse().unwrap()));
    }
}
