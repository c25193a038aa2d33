//! Open-document view of a chat request body.
//!
//! Bodies are kept as a generic JSON object so provider extension fields
//! (`tools`, `tool_choice`, sampling knobs, ...) travel upstream verbatim.
//! Only the handful of fields the gateway inspects get typed accessors.

use bytes::Bytes;
use serde_json::{Map, Value};

pub const MODEL: &str = "model";
pub const MESSAGES: &str = "messages";
pub const STREAM: &str = "stream";
pub const TOOLS: &str = "tools";
pub const THINKING: &str = "thinking";
pub const TOOL_STREAM: &str = "tool_stream";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatDocument {
    fields: Map<String, Value>,
}

impl ChatDocument {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn model(&self) -> Option<&str> {
        self.fields.get(MODEL).and_then(Value::as_str)
    }

    pub fn messages(&self) -> Option<&[Value]> {
        self.fields
            .get(MESSAGES)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    /// The literal `stream` flag; `None` when absent or not a boolean.
    pub fn stream_flag(&self) -> Option<bool> {
        self.fields.get(STREAM).and_then(Value::as_bool)
    }

    /// Whether the caller expects an incremental response. The local dialect
    /// streams by default, so only an explicit `false` opts out.
    pub fn wants_stream(&self) -> bool {
        self.stream_flag() != Some(false)
    }

    pub fn has_tools(&self) -> bool {
        self.fields
            .get(TOOLS)
            .and_then(Value::as_array)
            .is_some_and(|tools| !tools.is_empty())
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(&self.fields).map(Bytes::from)
    }
}
