//! Traffic router: forward everything that is not administrative to the
//! active environment.
//!
//! # Responsibilities
//! - Resolve the target once per request from a single deployment snapshot
//! - Rewrite scheme, authority and `Host` to the target
//! - Strip hop-by-hop headers, add `X-Forwarded-*`
//! - Stream request and response bodies
//!
//! # Design Decisions
//! - A request in flight keeps its target even if a switch commits
//! - No retries and no failover: only an explicit switch changes routing
//! - Dropping the inbound request drops the upstream call with it

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        uri::{PathAndQuery, Scheme},
        Request, Uri, Version,
    },
    response::{IntoResponse, Response},
};
use tokio::time;

use crate::environment::Upstream;
use crate::http::request::request_id;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Fallback handler for every non-administrative path.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();

    // One load per request; later commits do not affect this request.
    let deployment = state.store.deployment();
    let target = deployment.active;
    let upstream = deployment.active_upstream();

    let request_id = request_id(request.headers()).to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        environment = %target,
        upstream = %upstream,
        "Proxying request"
    );

    let outbound = match rewrite_request(request, upstream, peer) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to build upstream request");
            return ApiError::bad_request("request cannot be forwarded").into_response();
        }
    };

    match time::timeout(state.upstream_timeout, state.client.request(outbound)).await {
        Ok(Ok(response)) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            metrics::record_request(target, parts.status.as_u16(), start);
            Response::from_parts(parts, Body::new(body))
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, environment = %target, upstream = %upstream, error = %e, "Upstream error");
            metrics::record_request(target, 502, start);
            ApiError::bad_gateway(format!("{} environment is unavailable", target)).into_response()
        }
        Err(_) => {
            tracing::error!(
                request_id = %request_id,
                environment = %target,
                upstream = %upstream,
                timeout = ?state.upstream_timeout,
                "Upstream timed out"
            );
            metrics::record_request(target, 504, start);
            ApiError::gateway_timeout(format!("{} environment did not answer in time", target)).into_response()
        }
    }
}

/// Turn an inbound request into the request sent to `upstream`.
pub fn rewrite_request(
    request: Request<Body>,
    upstream: &Upstream,
    peer: Option<IpAddr>,
) -> Result<Request<Body>, axum::http::Error> {
    let (mut parts, body) = request.into_parts();

    let original_host = parts
        .headers
        .get(header::HOST)
        .cloned()
        .or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });

    let mut uri_parts = parts.uri.into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(upstream.authority().clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = Uri::from_parts(uri_parts)?;
    parts.version = Version::HTTP_11;

    strip_hop_by_hop(&mut parts.headers);

    parts
        .headers
        .insert(header::HOST, HeaderValue::from_str(upstream.authority().as_str())?);
    if let Some(host) = original_host {
        parts.headers.insert(X_FORWARDED_HOST, host);
    }
    parts
        .headers
        .insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    if let Some(ip) = peer {
        let forwarded = match parts.headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{}, {}", prior, ip),
            None => ip.to_string(),
        };
        parts
            .headers
            .insert(X_FORWARDED_FOR, HeaderValue::from_str(&forwarded)?);
    }

    Ok(Request::from_parts(parts, body))
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
