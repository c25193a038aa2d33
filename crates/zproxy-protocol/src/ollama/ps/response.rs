use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Running models. A gateway never has weights loaded, so this is always empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PsResponse {
    pub models: Vec<Value>,
}
