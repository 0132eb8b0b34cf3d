// Utils module for request helpers shared by the gate and the handlers
use axum::extract::{ConnectInfo, Request};
use axum::http::{header::USER_AGENT, HeaderMap};
use std::net::{IpAddr, SocketAddr};

/// Resolved client address, inserted into request extensions by the access gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client IP of a request.
///
/// Behind a trusted proxy the leftmost non-empty `X-Forwarded-For` entry wins,
/// then `X-Real-IP`. Otherwise the socket peer is used, and `"unknown"` when
/// the server was not started with connect info.
pub fn client_ip(req: &Request, trust_proxy: bool) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    resolve_client_ip(req.headers(), peer, trust_proxy)
}

pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        if let Some(ip) = forwarded.or_else(real_ip) {
            return canonical(ip);
        }
    }

    peer.map(|ip| ip.to_canonical().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parsable addresses are rewritten to their canonical text form so they match stored blocks
fn canonical(ip: &str) -> String {
    ip.parse::<IpAddr>()
        .map(|ip| ip.to_canonical().to_string())
        .unwrap_or_else(|_| ip.to_string())
}

pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
