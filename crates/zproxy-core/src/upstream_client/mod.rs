use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wreq::header::{AUTHORIZATION, CONTENT_TYPE};
use wreq::{Client, Proxy};

pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Dns,
    Tls,
    Timeout,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("upstream unreachable ({kind:?}): {message}")]
    BadGateway {
        kind: TransportErrorKind,
        message: String,
    },
    #[error("request canceled before upstream responded")]
    Canceled,
}

/// Process-wide client tuning, fixed at startup.
#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 50,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Shared keep-alive client for the chat upstream.
///
/// No whole-exchange or read timeout: generations can
/// stream for minutes, and in-flight calls end through the session token.
#[derive(Clone)]
pub struct UpstreamGateway {
    client: Client,
}

impl UpstreamGateway {
    pub fn new(config: &UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if let Some(proxy) = normalize_proxy(config.proxy.as_deref()) {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Posts `body` to `url`, bound to `cancel`.
    ///
    /// Any HTTP status counts as success here; only transport failures and
    /// cancellation are errors.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        trace_id: &str,
        url: &str,
        body: Bytes,
        api_key: &str,
    ) -> Result<wreq::Response, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Canceled);
        }

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if !api_key.is_empty() {
            request = request.header(AUTHORIZATION, format!("Bearer {api_key}"));
        }

        info!(event = "upstream_request", trace_id = %trace_id, url = %url);
        let started_at = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(
                    event = "upstream_response",
                    trace_id = %trace_id,
                    status = "canceled",
                    elapsed_ms = started_at.elapsed().as_millis()
                );
                return Err(GatewayError::Canceled);
            }
            result = request.send() => result,
        };

        match result {
            Ok(response) => {
                info!(
                    event = "upstream_response",
                    trace_id = %trace_id,
                    status = %response.status().as_u16(),
                    elapsed_ms = started_at.elapsed().as_millis()
                );
                Ok(response)
            }
            Err(err) => {
                let kind = classify_wreq_error(&err);
                warn!(
                    event = "upstream_response",
                    trace_id = %trace_id,
                    status = "error",
                    kind = ?kind,
                    elapsed_ms = started_at.elapsed().as_millis(),
                    error = %err
                );
                Err(GatewayError::BadGateway {
                    kind,
                    message: err.to_string(),
                })
            }
        }
    }
}

pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), CHAT_COMPLETIONS_PATH)
}

fn normalize_proxy(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|item| !item.is_empty())
}

fn classify_wreq_error(err: &wreq::Error) -> TransportErrorKind {
    let message = err.to_string().to_ascii_lowercase();
    if err.is_timeout() {
        return TransportErrorKind::Timeout;
    }
    if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            return TransportErrorKind::Dns;
        }
        if message.contains("tls") || message.contains("ssl") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }
    if message.contains("tls") || message.contains("ssl") {
        return TransportErrorKind::Tls;
    }
    TransportErrorKind::Other
}
