use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;
use uuid::Uuid;

/// Per-request state: trace id plus the cancellation token that every
/// suspending step of the request is bound to.
///
/// The token is a child of the process shutdown token and is cancelled when
/// the session is dropped, so tearing down the request (handler future
/// dropped on disconnect, or relay finished) stops anything still attached
/// to it.
pub struct ProxySession {
    trace_id: String,
    cancel: CancellationToken,
    started_at: Instant,
    _guard: DropGuard,
}

impl ProxySession {
    pub fn begin(shutdown: &CancellationToken) -> Self {
        let cancel = shutdown.child_token();
        Self {
            trace_id: Uuid::new_v4().to_string(),
            _guard: cancel.clone().drop_guard(),
            cancel,
            started_at: Instant::now(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }

    /// Cancels the session as soon as the receiving half of `downstream` is
    /// dropped, i.e. when the caller stops consuming the response body.
    pub fn watch_downstream<T>(&self, downstream: &mpsc::Sender<T>)
    where
        T: Send + 'static,
    {
        let downstream = downstream.clone();
        let cancel = self.cancel.clone();
        let trace_id = self.trace_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = downstream.closed() => {
                    debug!(event = "downstream_closed", trace_id = %trace_id);
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });
    }
}

impl std::fmt::Debug for ProxySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySession")
            .field("trace_id", &self.trace_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
