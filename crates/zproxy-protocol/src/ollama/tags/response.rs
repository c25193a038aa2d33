use serde::{Deserialize, Serialize};

use crate::ollama::types::ModelDetails;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsModel {
    pub name: String,
    pub model: String,
    /// RFC 3339 timestamp. Hosted models report a fixed epoch.
    pub modified_at: String,
    pub size: u64,
    pub digest: String,
    pub capabilities: Vec<String>,
    pub details: ModelDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsResponse {
    pub models: Vec<TagsModel>,
}
