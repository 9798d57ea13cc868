//! Rate limiting and API-key auth.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::warn;

use super::rate_limit::LimitScope;
use super::response::ApiError;
use super::SharedState;

/// Header Evolution clients send the key in.
pub const API_KEY_HEADER: &str = "apikey";

/// Resolve the client IP. `X-Forwarded-For` is only honoured when trusted.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    peer.map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn is_send_path(path: &str) -> bool {
    path.starts_with("/message/")
}

pub async fn enforce_rate_limit(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/health" {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer, state.trust_forwarded_for);

    if let Err(scope) = state.limiter.check(ip, is_send_path(path)) {
        state.metrics.record_rate_limited();
        crate::log_component!(warn, "gateway", "Rate limit exceeded", ip = ip.to_string(), path = path);
        let message = match scope {
            LimitScope::General => "Too many requests, try again later",
            LimitScope::Send => "Too many send requests, try again later",
        };
        return ApiError::rate_limited(message).into_response();
    }

    state.metrics.record_request();
    next.run(req).await
}

/// Key from `apikey`, or from `Authorization: Bearer`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|k| !k.is_empty())
        })
}

/// Constant-time key comparison. An empty expected key never matches.
pub fn keys_match(provided: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

pub async fn require_api_key(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let provided = extract_api_key(req.headers());
    let key_present = provided.is_some();
    let authorized = provided.is_some_and(|key| keys_match(key, &state.api_key));

    if authorized {
        return next.run(req).await;
    }

    state.metrics.record_auth_failure();
    warn!(
        path = req.uri().path(),
        key_present = key_present,
        "Rejected request with invalid API key"
    );
    ApiError::unauthorized().into_response()
}
