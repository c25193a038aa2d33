use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowRequest {
    #[serde(default)]
    pub name: String,
    /// Newer clients send `model` instead of `name`.
    #[serde(default)]
    pub model: String,
}

impl ShowRequest {
    /// The requested model name, preferring `name` over `model`.
    pub fn requested(&self) -> Option<&str> {
        [self.name.as_str(), self.model.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}
