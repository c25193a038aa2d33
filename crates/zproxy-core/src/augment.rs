use serde_json::{Value, json};

use crate::document::{ChatDocument, MODEL, THINKING, TOOL_STREAM};
use crate::registry::ModelDescriptor;

/// Rewrites a validated document into the upstream body.
///
/// Takes the document by value so the caller's copy is never aliased.
pub fn augment(mut document: ChatDocument, model: &ModelDescriptor) -> ChatDocument {
    document.insert(MODEL, Value::String(model.wire_name().to_string()));
    document.insert(THINKING, json!({ "type": "enabled" }));
    if wants_tool_stream(&document, model) {
        document.insert(TOOL_STREAM, Value::Bool(true));
    }
    document
}

/// Only a literal `stream: true` qualifies; an absent flag does not.
fn wants_tool_stream(document: &ChatDocument, model: &ModelDescriptor) -> bool {
    model.supports_tool_stream() && document.has_tools() && document.stream_flag() == Some(true)
}
