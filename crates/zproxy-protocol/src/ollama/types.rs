use serde::{Deserialize, Serialize};

/// Placeholder used for fields that only make sense for locally stored weights.
pub const CLOUD_PLACEHOLDER: &str = "cloud";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDetails {
    pub format: String,
    pub family: String,
    pub families: Vec<String>,
    pub parameter_size: String,
    pub quantization_level: String,
}

impl ModelDetails {
    /// Details for a hosted model of the given family.
    pub fn hosted(family: &str) -> Self {
        Self {
            format: family.to_string(),
            family: family.to_string(),
            families: vec![family.to_string()],
            parameter_size: CLOUD_PLACEHOLDER.to_string(),
            quantization_level: CLOUD_PLACEHOLDER.to_string(),
        }
    }
}
