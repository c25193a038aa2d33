use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ollama::types::ModelDetails;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowResponse {
    pub template: String,
    pub capabilities: Vec<String>,
    pub details: ModelDetails,
    /// Free-form `general.*` / `<family>.*` keys, as the local server reports them.
    pub model_info: Map<String, Value>,
}
