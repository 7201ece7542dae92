use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue, header::HOST},
    middleware::Next,
    response::Response,
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_SCHEME: &str = "x-forwarded-scheme";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const FORWARDED: &str = "forwarded";

/// Where a request really came from, after trusting upstream proxy headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Client address: forwarded value when present, else the socket peer.
    pub addr: Option<String>,
    /// Lower-cased scheme reported by the proxy.
    pub scheme: Option<String>,
    /// Host reported by the proxy.
    pub host: Option<String>,
}

impl ClientInfo {
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = header(headers, FORWARDED).map(parse_forwarded).unwrap_or_default();

        let addr = header(headers, X_FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .or_else(|| header(headers, X_REAL_IP).map(str::to_owned))
            .or(forwarded.addr)
            .or_else(|| peer.map(|p| p.ip().to_string()));

        let scheme = header(headers, X_FORWARDED_PROTO)
            .or_else(|| header(headers, X_FORWARDED_SCHEME))
            .map(str::to_owned)
            .or(forwarded.scheme)
            .map(|s| s.to_ascii_lowercase());

        let host = header(headers, X_FORWARDED_HOST)
            .map(str::to_owned)
            .or(forwarded.host);

        Self { addr, scheme, host }
    }

    pub fn addr_or_unknown(&self) -> &str {
        self.addr.as_deref().unwrap_or("unknown")
    }
}

/// Record a [`ClientInfo`] extension and rewrite `Host` from
/// `X-Forwarded-Host`.
pub async fn proxy_headers(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let info = ClientInfo::from_parts(request.headers(), peer);

    if let Some(host) = info.host.as_deref()
        && let Ok(value) = HeaderValue::from_str(host)
    {
        request.headers_mut().insert(HOST, value);
    }
    request.extensions_mut().insert(info);
    next.run(request).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// First element of an RFC 7239 `Forwarded` header.
fn parse_forwarded(value: &str) -> ClientInfo {
    let mut info = ClientInfo::default();
    let first = value.split(',').next().unwrap_or_default();
    for pair in first.split(';') {
        let Some((key, val)) = pair.split_once('=') else {
            continue;
        };
        let val = val.trim().trim_matches('"').to_owned();
        if val.is_empty() {
            continue;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "for" => info.addr = Some(val),
            "proto" => info.scheme = Some(val),
            "host" => info.host = Some(val),
            _ => {},
        }
    }
    info
}
