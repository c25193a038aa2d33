use serde_json::{Map, Value};

use crate::document::{ChatDocument, MESSAGES, MODEL};
use crate::error::ErrorKind;
use crate::registry::{ModelDescriptor, ModelRegistry};

pub const VALID_ROLES: [&str; 4] = ["system", "user", "assistant", "tool"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid JSON: {0}")]
    MalformedJson(String),
    #[error("{}", missing_field_message(.0))]
    MissingField(&'static str),
    #[error("message {index} must be an object")]
    InvalidMessage { index: usize },
    #[error("message {index} requires a role")]
    MissingRole { index: usize },
    #[error("message {index} has invalid role: {role}")]
    InvalidRole { index: usize, role: String },
    #[error("model '{0}' not found")]
    UnknownModel(String),
}

fn missing_field_message(field: &str) -> String {
    match field {
        MESSAGES => "messages is required and must be non-empty".to_string(),
        other => format!("{other} is required"),
    }
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MalformedJson(_) => ErrorKind::MalformedJson,
            ValidationError::MissingField(_) => ErrorKind::MissingField,
            ValidationError::InvalidMessage { .. } => ErrorKind::InvalidMessage,
            ValidationError::MissingRole { .. } | ValidationError::InvalidRole { .. } => {
                ErrorKind::InvalidRole
            }
            ValidationError::UnknownModel(_) => ErrorKind::UnknownModel,
        }
    }
}

/// A request that passed validation, paired with the registry entry it resolved to.
#[derive(Debug, Clone)]
pub struct NormalizedChat<'r> {
    pub document: ChatDocument,
    pub model: &'r ModelDescriptor,
}

impl NormalizedChat<'_> {
    pub fn wants_stream(&self) -> bool {
        self.document.wants_stream()
    }
}

/// Parses and validates a raw chat body. Fails fast on the first problem;
/// nothing in the document is modified here.
pub fn normalize<'r>(
    body: &[u8],
    registry: &'r ModelRegistry,
) -> Result<NormalizedChat<'r>, ValidationError> {
    let fields = parse_object(body)?;
    let document = ChatDocument::from_map(fields);

    let model = document
        .model()
        .filter(|model| !model.is_empty())
        .ok_or(ValidationError::MissingField(MODEL))?;

    let messages = document
        .messages()
        .filter(|messages| !messages.is_empty())
        .ok_or(ValidationError::MissingField(MESSAGES))?;

    for (index, message) in messages.iter().enumerate() {
        validate_message(index, message)?;
    }

    let descriptor = registry
        .lookup(model)
        .ok_or_else(|| ValidationError::UnknownModel(model.to_string()))?;

    Ok(NormalizedChat {
        document,
        model: descriptor,
    })
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(ValidationError::MalformedJson(
            "request body must be a JSON object".to_string(),
        )),
        Err(err) => Err(ValidationError::MalformedJson(err.to_string())),
    }
}

fn validate_message(index: usize, message: &Value) -> Result<(), ValidationError> {
    let message = message
        .as_object()
        .ok_or(ValidationError::InvalidMessage { index })?;
    let role = message
        .get("role")
        .and_then(Value::as_str)
        .filter(|role| !role.is_empty())
        .ok_or(ValidationError::MissingRole { index })?;
    if !VALID_ROLES.contains(&role) {
        return Err(ValidationError::InvalidRole {
            index,
            role: role.to_string(),
        });
    }
    Ok(())
}
