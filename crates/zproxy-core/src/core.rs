use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use tokio_util::sync::CancellationToken;

use crate::handler::chat_handler;
use crate::registry::ModelRegistry;
use crate::upstream_client::UpstreamGateway;

/// Both aliases IDE plugins use for chat.
pub const CHAT_ROUTES: [&str; 2] = ["/v1/chat/completions", "/api/chat"];

/// Inline images make chat bodies far larger than axum's default limit.
pub const MAX_CHAT_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Resolved upstream endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub base_url: String,
}

pub struct CoreState {
    pub registry: Arc<ModelRegistry>,
    pub gateway: UpstreamGateway,
    pub upstream: UpstreamConfig,
    /// Parent of every session token; cancelling it aborts all in-flight work.
    pub shutdown: CancellationToken,
}

pub struct Core {
    state: Arc<CoreState>,
}

impl Core {
    pub fn new(
        registry: Arc<ModelRegistry>,
        gateway: UpstreamGateway,
        upstream: UpstreamConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state: Arc::new(CoreState {
                registry,
                gateway,
                upstream,
                shutdown,
            }),
        }
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for route in CHAT_ROUTES {
            router = router.route(route, post(chat_handler));
        }
        router
            .layer(DefaultBodyLimit::max(MAX_CHAT_BODY_BYTES))
            .with_state(self.state.clone())
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        self.state.registry.clone()
    }
}
