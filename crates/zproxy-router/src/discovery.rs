use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{Map, Value, json};
use tracing::debug;

use zproxy_core::ModelRegistry;
use zproxy_core::registry::DEFAULT_MODEL;
use zproxy_protocol::ollama::ps::response::PsResponse;
use zproxy_protocol::ollama::show::request::ShowRequest;
use zproxy_protocol::ollama::show::response::ShowResponse;
use zproxy_protocol::ollama::tags::response::{TagsModel, TagsResponse};
use zproxy_protocol::ollama::types::ModelDetails;
use zproxy_protocol::ollama::version::response::VersionResponse;

/// Version IDE plugins expect from a local model server.
pub const REPORTED_VERSION: &str = "0.6.4";

/// Hosted models have no local file, so every entry reports the same timestamp.
pub const DISCOVERY_EPOCH: &str = "2024-01-01T00:00:00Z";

pub const SHOW_TEMPLATE: &str = "{{ .System }}\n{{ .Prompt }}";

/// Reported for names outside the registry.
const FALLBACK_FAMILY: &str = "glm";
const FALLBACK_CAPABILITIES: [&str; 2] = ["tools", "vision"];

pub fn discovery_router(registry: Arc<ModelRegistry>) -> Router {
    Router::new()
        .route("/api/tags", get(list_models))
        .route("/api/list", get(list_models))
        .route("/api/version", get(version))
        .route("/api/ps", get(running_models))
        .route("/api/show", post(show))
        .route("/healthz", get(healthz))
        .with_state(registry)
}

async fn list_models(State(registry): State<Arc<ModelRegistry>>) -> Response {
    Json(tags_response(&registry)).into_response()
}

async fn version() -> Response {
    Json(VersionResponse {
        version: REPORTED_VERSION.to_string(),
    })
    .into_response()
}

async fn running_models() -> Response {
    Json(PsResponse::default()).into_response()
}

async fn show(State(registry): State<Arc<ModelRegistry>>, body: Bytes) -> Response {
    // Plugins probe with empty or partial bodies; anything unreadable means "default".
    let request = serde_json::from_slice::<ShowRequest>(&body).unwrap_or_else(|err| {
        if !body.is_empty() {
            debug!(event = "show_body_ignored", error = %err);
        }
        ShowRequest::default()
    });
    let name = request.requested().unwrap_or(DEFAULT_MODEL);
    Json(show_model(&registry, name)).into_response()
}

async fn healthz() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub fn tags_response(registry: &ModelRegistry) -> TagsResponse {
    let models = registry
        .models()
        .map(|model| TagsModel {
            name: model.display_name().to_string(),
            model: model.display_name().to_string(),
            modified_at: DISCOVERY_EPOCH.to_string(),
            size: 0,
            digest: model.display_name().to_string(),
            capabilities: model.capabilities().to_vec(),
            details: ModelDetails::hosted(model.family()),
        })
        .collect();
    TagsResponse { models }
}

/// Metadata for `name`. Names the registry does not know are still answered,
/// with the hosted defaults and the default context length.
pub fn show_model(registry: &ModelRegistry, name: &str) -> ShowResponse {
    let descriptor = registry.lookup(name);
    let family = descriptor.map_or(FALLBACK_FAMILY, |model| model.family());
    let capabilities = descriptor.map_or_else(
        || FALLBACK_CAPABILITIES.map(String::from).to_vec(),
        |model| model.capabilities().to_vec(),
    );

    let mut model_info = Map::new();
    model_info.insert("general.basename".to_string(), Value::from(name));
    model_info.insert("general.architecture".to_string(), Value::from(family));
    model_info.insert(
        format!("{family}.context_length"),
        Value::from(registry.context_length(name)),
    );

    ShowResponse {
        template: SHOW_TEMPLATE.to_string(),
        capabilities,
        details: ModelDetails::hosted(family),
        model_info,
    }
}
