use crate::GlobalConfigPatch;

/// Checked in order; the first non-empty value wins.
pub const API_KEY_VARS: [&str; 3] = ["ZAI_API_KEY", "ZAI_CODING_API_KEY", "GLM_API_KEY"];

pub fn env_patch() -> GlobalConfigPatch {
    env_patch_from(|name| std::env::var(name).ok())
}

/// Builds the environment layer from an arbitrary lookup, so callers can
/// resolve against something other than the process environment.
pub fn env_patch_from(lookup: impl Fn(&str) -> Option<String>) -> GlobalConfigPatch {
    let get = |name: &str| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    GlobalConfigPatch {
        api_key: API_KEY_VARS.iter().find_map(|name| get(name)),
        base_url: get("ZAI_BASE_URL"),
        host: get("ZAI_HOST"),
        port: get("ZAI_PORT").and_then(|value| value.parse().ok()),
        debug: get("ZAI_DEBUG").map(|value| parse_flag(&value)),
        proxy: get("ZAI_PROXY"),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
