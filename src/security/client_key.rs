//! Client identity derivation.
//!
//! The key is the normalized peer IP, or the first `X-Forwarded-For` hop when
//! the gateway sits behind a trusted load balancer. Only the first hop is used;
//! the rest of the chain is client-controlled.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Stable identity for one client, used to bucket rate state and label log entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_canonical().to_string())
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientKeyExtractor {
    trust_forwarded_for: bool,
}

impl ClientKeyExtractor {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self { trust_forwarded_for }
    }

    /// Derive the key for a request arriving from `peer`.
    pub fn extract(&self, headers: &HeaderMap, peer: SocketAddr) -> ClientKey {
        if self.trust_forwarded_for {
            if let Some(ip) = first_forwarded_hop(headers) {
                return ClientKey::from(ip);
            }
        }
        ClientKey::from(peer.ip())
    }
}

/// First parseable address in `X-Forwarded-For`, tolerating ports and brackets.
fn first_forwarded_hop(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    let hop = value.split(',').next()?.trim();
    if hop.is_empty() {
        return None;
    }

    hop.parse::<IpAddr>()
        .ok()
        .or_else(|| hop.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.9:51234".parse().unwrap()
    }

    fn with_xff(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn uses_peer_without_header() {
        let key = ClientKeyExtractor::new(true).extract(&HeaderMap::new(), peer());
        assert_eq!(key.as_str(), "10.0.0.9");
    }

    #[test]
    fn uses_first_forwarded_hop() {
        let key = ClientKeyExtractor::new(true)
            .extract(&with_xff("203.0.113.7, 10.0.0.1, 10.0.0.2"), peer());
        assert_eq!(key.as_str(), "203.0.113.7");
    }

    #[test]
    fn strips_port_from_hop() {
        let key = ClientKeyExtractor::new(true).extract(&with_xff("[2001:db8::1]:443"), peer());
        assert_eq!(key.as_str(), "2001:db8::1");
    }

    #[test]
    fn ignores_header_when_untrusted() {
        let key = ClientKeyExtractor::new(false).extract(&with_xff("203.0.113.7"), peer());
        assert_eq!(key.as_str(), "10.0.0.9");
    }

    #[test]
    fn garbage_hop_falls_back_to_peer() {
        let key = ClientKeyExtractor::new(true).extract(&with_xff("unknown, 203.0.113.7"), peer());
        assert_eq!(key.as_str(), "10.0.0.9");
    }

    #[test]
    fn mapped_ipv6_is_normalized() {
        let peer: SocketAddr = "[::ffff:192.0.2.4]:80".parse().unwrap();
        let key = ClientKeyExtractor::new(false).extract(&HeaderMap::new(), peer);
        assert_eq!(key.as_str(), "192.0.2.4");
    }
}
