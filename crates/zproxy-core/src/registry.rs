//! Static catalog of the models this gateway advertises and forwards.
//!
//! The registry is built once at startup and shared read-only (behind an
//! `Arc`) by every request; it is never mutated afterwards.

/// Context window reported for names the registry does not know.
pub const DEFAULT_CONTEXT_LENGTH: u32 = 128_000;

/// Model advertised when a discovery client does not name one.
pub const DEFAULT_MODEL: &str = "GLM-4.6";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    display_name: String,
    wire_name: String,
    family: String,
    capabilities: Vec<String>,
    context_length: u32,
    tool_stream: bool,
}

impl ModelDescriptor {
    /// The wire name is lowercased here, so a descriptor can never carry a
    /// mixed-case upstream identifier.
    pub fn new(
        display_name: impl Into<String>,
        wire_name: impl AsRef<str>,
        family: impl Into<String>,
        context_length: u32,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            wire_name: wire_name.as_ref().to_ascii_lowercase(),
            family: family.into(),
            capabilities: Vec::new(),
            context_length,
            tool_stream: false,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for capability in capabilities {
            let capability = capability.into();
            if !self.capabilities.contains(&capability) {
                self.capabilities.push(capability);
            }
        }
        self
    }

    /// Marks the model as accepting incremental tool-call streaming upstream.
    pub fn with_tool_stream(mut self, enabled: bool) -> Self {
        self.tool_stream = enabled;
        self
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn context_length(&self) -> u32 {
        self.context_length
    }

    pub fn supports_tool_stream(&self) -> bool {
        self.tool_stream
    }

    fn matches(&self, name: &str) -> bool {
        self.display_name.eq_ignore_ascii_case(name) || self.wire_name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    /// The hosted GLM catalog.
    pub fn builtin() -> Self {
        let glm = |display: &str, context_length: u32, tool_stream: bool| {
            ModelDescriptor::new(display, display, "glm", context_length)
                .with_capabilities(["tools", "vision"])
                .with_tool_stream(tool_stream)
        };
        Self::new(vec![
            glm("GLM-4.7", 200_000, true),
            glm("GLM-4.6", 200_000, true),
            glm("GLM-4.5", 128_000, false),
            glm("GLM-4.5-Air", 128_000, false),
        ])
    }

    /// Case-insensitive match against both display and wire names. No other
    /// normalization: surrounding whitespace makes a name unknown.
    pub fn lookup(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|model| model.matches(name))
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Returns `name` unchanged when it is not registered; call
    /// [`ModelRegistry::is_valid`] first to tell the two cases apart.
    pub fn canonical_wire_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.lookup(name).map_or(name, ModelDescriptor::wire_name)
    }

    pub fn context_length(&self, name: &str) -> u32 {
        self.lookup(name)
            .map_or(DEFAULT_CONTEXT_LENGTH, ModelDescriptor::context_length)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
