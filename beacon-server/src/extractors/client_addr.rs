use std::convert::Infallible;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::service::ServiceState;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// The address of the requesting client, used to partition admission control.
///
/// Resolves to the peer address of the connection. If forwarded headers are trusted, the last
/// entry of `X-Forwarded-For` takes precedence. Requests without any resolvable address share a
/// single partition.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ClientAddr(Option<IpAddr>);

impl ClientAddr {
    /// Resolves the client address from request headers and the connection's peer address.
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> Self {
        let forwarded = trust_forwarded_for
            .then(|| last_forwarded_for(headers))
            .flatten();

        Self(forwarded.or(peer.map(|addr| addr.ip())))
    }

    /// Returns the IP address, if known.
    pub fn ip(self) -> Option<IpAddr> {
        self.0
    }
}

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ip) => ip.fmt(f),
            None => f.write_str("unknown"),
        }
    }
}

fn last_forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get_all(FORWARDED_FOR).iter().last()?;
    let last = value.to_str().ok()?.rsplit(',').next()?.trim();

    last.parse::<IpAddr>()
        .ok()
        .or_else(|| last.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

impl FromRequestParts<ServiceState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self::resolve(
            &parts.headers,
            peer,
            state.config().trust_forwarded_for(),
        ))
    }
}
