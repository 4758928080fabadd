//! Small helpers for the auth handler.

use axum::http::{HeaderMap, HeaderName};
use std::net::{IpAddr, SocketAddr};

/// Resolve the client origin used as the rate-limit key.
///
/// When a trusted proxy header is configured and carries a parseable address,
/// its first hop wins; otherwise the peer socket address is used.
pub(super) fn client_origin(
    headers: &HeaderMap,
    peer: SocketAddr,
    trusted_header: Option<&HeaderName>,
) -> IpAddr {
    trusted_header
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .and_then(|value| value.parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::net::Ipv4Addr;

    const PEER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 40000);

    fn forwarded_for(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn uses_peer_without_trusted_header() {
        let headers = forwarded_for("203.0.113.7");
        assert_eq!(client_origin(&headers, PEER, None), PEER.ip());
    }

    #[test]
    fn uses_first_hop_of_trusted_header() {
        let name = HeaderName::from_static("x-forwarded-for");
        let headers = forwarded_for(" 203.0.113.7 , 10.0.0.2");
        assert_eq!(
            client_origin(&headers, PEER, Some(&name)),
            IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))
        );
    }

    #[test]
    fn falls_back_to_peer_on_garbage_or_missing_header() {
        let name = HeaderName::from_static("x-forwarded-for");
        assert_eq!(
            client_origin(&forwarded_for("not-an-ip"), PEER, Some(&name)),
            PEER.ip()
        );
        assert_eq!(client_origin(&HeaderMap::new(), PEER, Some(&name)), PEER.ip());
    }

    #[test]
    fn accepts_ipv6_origins() {
        let name = HeaderName::from_static("cf-connecting-ip");
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(
            client_origin(&headers, PEER, Some(&name)).to_string(),
            "2001:db8::1"
        );
    }
}
