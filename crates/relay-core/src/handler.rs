//! Inbound routing (spec.md §6): parses the `/proxy/<group-name>[/id_<n>]/
//! <vendor-path>[?query]` path grammar, resolves the group snapshot,
//! classifies stream/model, and hands everything to the `RetryExecutor`.
//! Grounded on `gproxy-core::handler`'s `proxy_handler` (single entry
//! point keyed by a path segment, `Bytes` body extraction, structured
//! `tracing` spans around dispatch) — the per-vendor
//! `ProxyRequest` enum classification is replaced with this spec's
//! stateless `ChannelAdapter::is_stream_request`/`extract_model`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use relay_channels::adapter_for;
use relay_provider_core::Headers;
use relay_storage::StorageError;

use crate::core::CoreState;
use crate::error::ProxyError;
use crate::executor::{IncomingRequest, ProxyOutcome};

pub async fn proxy_handler(
    State(state): State<Arc<CoreState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Path((group_name, rest)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let started_at = Instant::now();

    let group = match state.group_store.get_group_by_name(&group_name).await {
        Ok(group) => group,
        Err(StorageError::GroupNotFound(name)) => {
            return ProxyError::not_found(format!("unknown group {name}")).into_response();
        }
        Err(StorageError::Other(message)) => {
            return ProxyError::bad_request(message).into_response();
        }
    };

    let (single_credential_id, vendor_path) = split_single_credential_segment(&rest);
    if vendor_path.is_empty() {
        return ProxyError::bad_request("missing vendor path").into_response();
    }

    let vendor_path_and_query = match uri.query() {
        Some(query) if !query.is_empty() => format!("/{vendor_path}?{query}"),
        _ => format!("/{vendor_path}"),
    };
    let request_path_and_query = format!("/proxy/{group_name}{vendor_path_and_query}");

    let adapter = adapter_for(group.channel);
    let is_stream = adapter.is_stream_request(&vendor_path_and_query, &body);
    let model = adapter.extract_model(&vendor_path_and_query, &body);

    let incoming = IncomingRequest {
        group,
        method,
        request_path_and_query,
        headers: headers_to_vec(&headers),
        body,
        source_ip: source_ip(&headers, connect_info),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        single_credential_id,
        is_stream,
        model,
    };

    let outcome = state.executor.run(incoming).await;
    tracing::debug!(group = %group_name, elapsed_ms = started_at.elapsed().as_millis(), "proxy_handler done");
    outcome_to_response(outcome)
}

/// Strips a leading `id_<n>` path segment, if present, returning the
/// credential id and the remaining vendor path (spec.md §6).
fn split_single_credential_segment(rest: &str) -> (Option<i64>, String) {
    let rest = rest.trim_start_matches('/');
    let Some((first, remainder)) = rest.split_once('/') else {
        return (parse_id_segment(rest), String::new());
    };
    match parse_id_segment(first) {
        Some(id) => (Some(id), remainder.to_string()),
        None => (None, rest.to_string()),
    }
}

fn parse_id_segment(segment: &str) -> Option<i64> {
    segment.strip_prefix("id_")?.parse::<i64>().ok()
}

fn headers_to_vec(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn source_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn outcome_to_response(outcome: ProxyOutcome) -> Response {
    match outcome {
        ProxyOutcome::Buffered { status, headers, body } => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            apply_headers(&mut response, headers);
            response
        }
        ProxyOutcome::Stream { status, headers, body } => {
            let mut response = Response::new(Body::from_stream(body));
            *response.status_mut() = status;
            apply_headers(&mut response, headers);
            response
        }
    }
}

fn apply_headers(response: &mut Response, headers: Headers) {
    for (name, value) in headers {
        let Ok(header_name) = axum::http::HeaderName::try_from(name) else {
            continue;
        };
        let Ok(header_value) = axum::http::HeaderValue::from_str(&value) else {
            continue;
        };
        response.headers_mut().insert(header_name, header_value);
    }
}
