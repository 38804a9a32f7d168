//! Forwarding to STS.
//!
//! Every request that does not hit a local route lands in [`forward`]. The
//! body is buffered once, the rewriter decides what to send, and the
//! upstream response is relayed back as received.

use axum::{
    body::Body,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::Response,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::error::ProxyError;
use crate::rewrite::{InboundRequest, RewritePlan};
use crate::state::AppState;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Fallback handler: rewrite when possible, forward always.
pub async fn forward(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ProxyError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProxyError::PayloadTooLarge {
                limit: state.max_body_bytes,
            }
        } else {
            ProxyError::ReadBody(rejection.body_text())
        }
    })?;

    let inbound = InboundRequest {
        method: method.clone(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
    };

    let (target, body, content_length) = match state.rewriter.rewrite(&inbound).await {
        RewritePlan::Rewritten {
            target,
            body,
            content_length,
        } => (target, body, content_length),
        RewritePlan::Passthrough => {
            let length = inbound.body.len();
            (state.sts_endpoint().clone(), inbound.body, length)
        }
    };
    let url = upstream_url(&target, &uri);
    debug!(%method, %url, content_length, "Forwarding request");

    let mut outbound_headers = end_to_end_headers(&headers, true);
    if !body.is_empty() || method == Method::POST {
        outbound_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    }

    let upstream = state
        .http
        .request(method, url)
        .headers(outbound_headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let response_headers = end_to_end_headers(upstream.headers(), false);
    let response_body = upstream.bytes().await?;

    let mut response = Response::new(Body::from(response_body));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Join the inbound path and query onto `base`.
///
/// Paths are concatenated with exactly one slash between them. A query on
/// `base` is kept and the inbound query appended after it.
pub fn upstream_url(base: &Url, uri: &Uri) -> Url {
    let mut url = base.clone();
    let path = join_paths(base.path(), uri.path());
    url.set_path(&path);

    let base_query = base.query().filter(|q| !q.is_empty());
    let inbound_query = uri.query().filter(|q| !q.is_empty());
    let query = match (base_query, inbound_query) {
        (Some(base), Some(inbound)) => Some(format!("{base}&{inbound}")),
        (Some(base), None) => Some(base.to_string()),
        (None, inbound) => inbound.map(str::to_string),
    };
    url.set_query(query.as_deref());
    url
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Copy `headers` without hop-by-hop headers or the names listed in `Connection`.
///
/// `Content-Length` is always recomputed from the forwarded body. `Host` is
/// dropped on requests so the client sets it for the upstream.
fn end_to_end_headers(headers: &HeaderMap, request: bool) -> HeaderMap {
    let connection_listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let dropped = HOP_BY_HOP.contains(&name.as_str())
            || connection_listed.contains(name)
            || *name == header::CONTENT_LENGTH
            || (request && *name == header::HOST);
        if !dropped {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}
