mod discovery;

use axum::Router;
use zproxy_core::Core;

pub use discovery::{
    DISCOVERY_EPOCH, REPORTED_VERSION, SHOW_TEMPLATE, discovery_router, show_model, tags_response,
};

/// The full application: discovery endpoints plus the chat routes.
pub fn app_router(core: &Core) -> Router {
    Router::new()
        .merge(discovery_router(core.registry()))
        .merge(core.router())
}
