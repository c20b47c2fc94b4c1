//! Lenient request decoding and `print` validation.

use serde_json::{Map, Value};

use crate::constants::{ACTION_PRINT, FIELD_FILE_NAME, FIELD_IMAGE_DATA, LOG_PREFIX_CHARS};
use crate::messages::{InboundRequest, PrintRequest};

/// Failure to read a message as a JSON object.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON at line {line}, column {column}: {source}")]
    MalformedSyntax {
        line: usize,
        column: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl From<serde_json::Error> for DecodeError {
    fn from(source: serde_json::Error) -> Self {
        Self::MalformedSyntax {
            line: source.line(),
            column: source.column(),
            source,
        }
    }
}

/// A well-formed message that does not describe a runnable request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("missing action")]
    MissingAction,

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("missing or empty field: {0}")]
    MissingField(&'static str),
}

/// Decodes one complete message.
///
/// The top-level value must be a JSON object. `action`, `imageData` and
/// `fileName` are all optional at this stage: absent or `null` fields
/// become `None` (an empty action), strings are taken as-is and any other
/// value is kept as its JSON text.
pub fn decode_request(text: &str) -> Result<InboundRequest, DecodeError> {
    let mut object: Map<String, Value> = serde_json::from_str(text)?;

    Ok(InboundRequest {
        action: take_string(&mut object, "action").unwrap_or_default(),
        image_data: take_string(&mut object, FIELD_IMAGE_DATA),
        file_name: take_string(&mut object, FIELD_FILE_NAME),
    })
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl InboundRequest {
    /// Checks the request against its action.
    ///
    /// Only `print` is runnable, and it needs both `imageData` and
    /// `fileName` to be non-empty.
    pub fn validate(&self) -> Result<PrintRequest, ValidationFailure> {
        match self.action.as_str() {
            "" => Err(ValidationFailure::MissingAction),
            ACTION_PRINT => {
                let image_data = non_empty(&self.image_data)
                    .ok_or(ValidationFailure::MissingField(FIELD_IMAGE_DATA))?;
                let file_name = non_empty(&self.file_name)
                    .ok_or(ValidationFailure::MissingField(FIELD_FILE_NAME))?;
                Ok(PrintRequest {
                    image_data: image_data.to_owned(),
                    file_name: file_name.to_owned(),
                })
            }
            other => Err(ValidationFailure::UnsupportedAction(other.to_owned())),
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Returns the first [`LOG_PREFIX_CHARS`] characters of `text`.
///
/// Messages can carry megabytes of base64; logs only quote the head.
pub fn log_prefix(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREFIX_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
