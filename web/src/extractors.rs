//! Custom Axum extractors.
//!
//! - `ClientIp`: rate-limit identity, the connection peer unless it is a
//!   trusted proxy
//! - `BearerToken`: token from the `Authorization` header
//!
//! # Examples
//!
//! ```ignore
//! async fn revoke(client_ip: ClientIp, BearerToken(token): BearerToken) -> Result<Json<Revoked>, AppError> {
//!     tracing::info!(client_ip = %client_ip.0, "Revoking token");
//!     // ...
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Proxies whose forwarding headers are believed.
///
/// Empty by default: forwarding headers are then ignored entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    /// Trust the given proxy addresses.
    #[must_use]
    pub fn new(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(proxies.into_iter().collect())
    }

    /// Trust no proxy.
    #[must_use]
    pub fn none() -> Self {
        Self::new([])
    }

    /// Whether `ip` is a trusted proxy.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }
}

impl Default for TrustedProxies {
    fn default() -> Self {
        Self::none()
    }
}

/// Client IP address.
///
/// # Resolution
///
/// 1. The connection peer (`127.0.0.1` when served without connect info)
/// 2. If the peer is a trusted proxy: the right-most `X-Forwarded-For` hop
///    that is not itself a trusted proxy
/// 3. If the peer is a trusted proxy and sent no usable `X-Forwarded-For`:
///    `X-Real-IP`
///
/// Hops left of the first untrusted one are client-controlled and never used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    TrustedProxies: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trusted = TrustedProxies::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or(IpAddr::V4(Ipv4Addr::LOCALHOST), |info| info.0.ip());

        Ok(Self(resolve_client_ip(&parts.headers, peer, &trusted)))
    }
}

fn resolve_client_ip(headers: &HeaderMap, peer: IpAddr, trusted: &TrustedProxies) -> IpAddr {
    if !trusted.contains(&peer) {
        return peer;
    }

    forwarded_client(headers, trusted)
        .or_else(|| {
            headers
                .get("X-Real-IP")?
                .to_str()
                .ok()?
                .trim()
                .parse()
                .ok()
        })
        .unwrap_or(peer)
}

/// Walk `X-Forwarded-For` from the nearest hop outwards, skipping trusted
/// proxies. Stops at the first unparsable hop.
fn forwarded_client(headers: &HeaderMap, trusted: &TrustedProxies) -> Option<IpAddr> {
    let hops: Vec<&str> = headers
        .get_all("X-Forwarded-For")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .collect();

    let mut client = None;
    for hop in hops.iter().rev() {
        let Ok(ip) = hop.parse::<IpAddr>() else {
            break;
        };
        client = Some(ip);
        if !trusted.contains(&ip) {
            break;
        }
    }
    client
}

/// Bearer token from `Authorization: Bearer <token>`.
///
/// Rejects with 401 `INVALID_TOKEN` when the header is missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(AppError::invalid_token)?;

        let (scheme, token) = value.split_once(' ').ok_or_else(AppError::invalid_token)?;
        let token = token.trim();

        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(AppError::invalid_token());
        }

        Ok(Self(token.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    const PROXY: [u8; 4] = [10, 0, 0, 1];

    fn from_peer(peer: [u8; 4]) -> axum::http::request::Builder {
        Request::builder().extension(ConnectInfo(SocketAddr::from((peer, 41000))))
    }

    async fn client_ip(request: Request<()>, trusted: &TrustedProxies) -> IpAddr {
        let (mut parts, ()) = request.into_parts();
        ClientIp::from_request_parts(&mut parts, trusted)
            .await
            .unwrap()
            .0
    }

    fn behind_proxy() -> TrustedProxies {
        TrustedProxies::new([IpAddr::from(PROXY)])
    }

    async fn bearer(value: Option<&str>) -> Result<BearerToken, AppError> {
        let mut builder = Request::builder();
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        BearerToken::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_untrusted_peer_ignores_forwarding_headers() {
        let request = from_peer([192, 0, 2, 9])
            .header("X-Forwarded-For", "203.0.113.1")
            .header("X-Real-IP", "198.51.100.42")
            .body(())
            .unwrap();

        assert_eq!(
            client_ip(request, &TrustedProxies::none()).await.to_string(),
            "192.0.2.9"
        );
    }

    #[tokio::test]
    async fn test_trusted_proxy_uses_rightmost_untrusted_hop() {
        // Left-most entry is whatever the client claimed
        let request = from_peer(PROXY)
            .header("X-Forwarded-For", "1.2.3.4, 203.0.113.1")
            .body(())
            .unwrap();

        assert_eq!(
            client_ip(request, &behind_proxy()).await.to_string(),
            "203.0.113.1"
        );
    }

    #[tokio::test]
    async fn test_trusted_hops_are_skipped() {
        let trusted = TrustedProxies::new([IpAddr::from(PROXY), IpAddr::from([10, 0, 0, 2])]);
        let request = from_peer(PROXY)
            .header("X-Forwarded-For", "203.0.113.1, 10.0.0.2")
            .body(())
            .unwrap();

        assert_eq!(client_ip(request, &trusted).await.to_string(), "203.0.113.1");
    }

    #[tokio::test]
    async fn test_unparsable_hop_stops_the_walk() {
        let request = from_peer(PROXY)
            .header("X-Forwarded-For", "203.0.113.1, garbage")
            .body(())
            .unwrap();

        assert_eq!(client_ip(request, &behind_proxy()).await.to_string(), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_trusted_proxy_x_real_ip() {
        let request = from_peer(PROXY)
            .header("X-Real-IP", "198.51.100.42")
            .body(())
            .unwrap();

        assert_eq!(
            client_ip(request, &behind_proxy()).await.to_string(),
            "198.51.100.42"
        );
    }

    #[tokio::test]
    async fn test_client_ip_fallback() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.1")
            .body(())
            .unwrap();

        assert_eq!(
            client_ip(request, &TrustedProxies::none()).await.to_string(),
            "127.0.0.1"
        );
    }

    #[tokio::test]
    async fn test_bearer_token() {
        assert_eq!(
            bearer(Some("Bearer abc.def.ghi")).await.unwrap(),
            BearerToken("abc.def.ghi".into())
        );
        assert_eq!(
            bearer(Some("bearer abc")).await.unwrap(),
            BearerToken("abc".into())
        );
    }

    #[tokio::test]
    async fn test_bearer_token_rejections() {
        for value in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer "), Some("Bearer")] {
            let err = bearer(value).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_TOKEN");
        }
    }
}
