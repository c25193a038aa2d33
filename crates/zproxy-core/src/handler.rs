use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::augment::augment;
use crate::core::CoreState;
use crate::error::{ErrorKind, ProxyError};
use crate::normalize::normalize;
use crate::relay::{RelayError, StreamRelay};
use crate::session::ProxySession;
use crate::upstream_client::chat_completions_url;

pub const REQUEST_ID_HEADER: &str = "x-zproxy-request-id";

const EVENT_STREAM: &str = "text/event-stream";
const APPLICATION_JSON: &str = "application/json";

/// At most one relayed chunk waits for the socket at a time.
const RELAY_QUEUE_DEPTH: usize = 1;

type BodyChunk = Result<Bytes, io::Error>;

pub async fn chat_handler(State(state): State<Arc<CoreState>>, body: Bytes) -> Response {
    let session = ProxySession::begin(&state.shutdown);
    let trace_id = session.trace_id().to_string();
    let started_at = Instant::now();

    match proxy_chat(&state, session, body).await {
        Ok(response) => {
            info!(
                event = "downstream_responded",
                trace_id = %trace_id,
                status = %response.status().as_u16(),
                elapsed_ms = started_at.elapsed().as_millis()
            );
            response
        }
        Err(err) => {
            if err.kind == ErrorKind::Canceled {
                debug!(
                    event = "downstream_responded",
                    trace_id = %trace_id,
                    status = %err.status.as_u16(),
                    elapsed_ms = started_at.elapsed().as_millis(),
                    "client went away"
                );
            } else {
                warn!(
                    event = "downstream_responded",
                    trace_id = %trace_id,
                    status = %err.status.as_u16(),
                    kind = err.kind.as_str(),
                    error = %err.message,
                    elapsed_ms = started_at.elapsed().as_millis()
                );
            }
            let mut response = err.into_response();
            insert_request_id(response.headers_mut(), &trace_id);
            response
        }
    }
}

/// Validation, augmentation and the upstream call, strictly in that order.
/// Nothing here touches the network until the body has been validated.
async fn proxy_chat(
    state: &CoreState,
    session: ProxySession,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let chat = normalize(&body, &state.registry)?;
    let wants_stream = chat.wants_stream();
    info!(
        event = "downstream_received",
        trace_id = %session.trace_id(),
        model = %chat.model.wire_name(),
        is_stream = wants_stream
    );

    let upstream_body = augment(chat.document, chat.model)
        .to_bytes()
        .map_err(|_| ProxyError::internal("Failed to prepare upstream request"))?;

    let url = chat_completions_url(&state.upstream.base_url);
    let upstream = state
        .gateway
        .send(
            session.cancel_token(),
            session.trace_id(),
            &url,
            upstream_body,
            &state.upstream.api_key,
        )
        .await?;

    Ok(relay_response(session, upstream, wants_stream))
}

/// Builds the caller response from the upstream one. Status and headers are
/// fixed here, before any body byte is relayed; the body is copied by a
/// background relay that owns the session from now on.
fn relay_response(session: ProxySession, upstream: wreq::Response, wants_stream: bool) -> Response {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        // Hyper sets framing itself.
        if is_hop_by_hop_or_framing_header(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    negotiate_content_type(&mut headers, wants_stream);
    if has_sse_content_type(&headers) {
        // Hint common reverse proxies to avoid buffering SSE responses.
        headers
            .entry(header::CACHE_CONTROL)
            .or_insert(HeaderValue::from_static("no-cache"));
        headers
            .entry(HeaderName::from_static("x-accel-buffering"))
            .or_insert(HeaderValue::from_static("no"));
    }
    insert_request_id(&mut headers, session.trace_id());

    let (tx, rx) = mpsc::channel::<BodyChunk>(RELAY_QUEUE_DEPTH);
    session.watch_downstream(&tx);
    tokio::spawn(relay_body(session, upstream, tx, status));

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

async fn relay_body(
    session: ProxySession,
    upstream: wreq::Response,
    mut tx: mpsc::Sender<BodyChunk>,
    status: StatusCode,
) {
    let mut relay = StreamRelay::new();
    let result = relay
        .run(session.cancel_token(), &mut tx, upstream.bytes_stream())
        .await;

    match result {
        Ok(stats) => {
            info!(
                event = "relay_finished",
                trace_id = %session.trace_id(),
                status = %status.as_u16(),
                chunks = stats.chunks,
                bytes = stats.bytes,
                elapsed_ms = session.elapsed_ms()
            );
        }
        Err(err @ (RelayError::Canceled | RelayError::WriteFailed)) => {
            debug!(
                event = "relay_finished",
                trace_id = %session.trace_id(),
                outcome = %err,
                kind = ProxyError::from(err.clone()).kind.as_str(),
                bytes = relay.stats().bytes,
                elapsed_ms = session.elapsed_ms()
            );
        }
        Err(err) => {
            warn!(
                event = "relay_finished",
                trace_id = %session.trace_id(),
                outcome = %err,
                kind = ProxyError::from(err.clone()).kind.as_str(),
                bytes = relay.stats().bytes,
                elapsed_ms = session.elapsed_ms()
            );
            // End the body abnormally so the caller cannot mistake a truncated
            // stream for a complete one.
            let _ = tx.send(Err(io::Error::other(err.to_string()))).await;
        }
    }
}

/// Upstream content type wins; only a missing one is filled from the
/// request's stream preference.
fn negotiate_content_type(headers: &mut HeaderMap, wants_stream: bool) {
    if headers.contains_key(header::CONTENT_TYPE) {
        return;
    }
    let content_type = if wants_stream {
        EVENT_STREAM
    } else {
        APPLICATION_JSON
    };
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
}

fn has_sse_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains(EVENT_STREAM))
        .unwrap_or(false)
}

fn insert_request_id(headers: &mut HeaderMap, trace_id: &str) {
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}

fn is_hop_by_hop_or_framing_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("proxy-authenticate")
        || name.eq_ignore_ascii_case("proxy-authorization")
        || name.eq_ignore_ascii_case("te")
        || name.eq_ignore_ascii_case("trailer")
        || name.eq_ignore_ascii_case("upgrade")
}
