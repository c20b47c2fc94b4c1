//! Request and response payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::constants::{ACTION_PRINT, PRINT_SUCCESS_DETAIL, ResponseAction};

/// A decoded client message.
///
/// Only `action` is always present; the payload fields are optional until
/// [`validate`](InboundRequest::validate) checks them against the action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl InboundRequest {
    /// Builds a `print` request.
    pub fn print(image_data: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            action: ACTION_PRINT.into(),
            image_data: Some(image_data.into()),
            file_name: Some(file_name.into()),
        }
    }
}

/// A `print` request whose required fields are present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintRequest {
    pub image_data: String,
    pub file_name: String,
}

impl PrintRequest {
    /// Decodes the base64 image payload.
    ///
    /// ASCII whitespace (line wrapping from encoders such as `base64 -w76`)
    /// is ignored.
    pub fn image_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if self.image_data.bytes().any(|b| b.is_ascii_whitespace()) {
            let compact: String = self
                .image_data
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            STANDARD.decode(compact)
        } else {
            STANDARD.decode(&self.image_data)
        }
    }
}

/// Server reply.
///
/// Field names are fixed by existing clients: the status text travels in
/// `ImageData` and `FileName` is always `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundResponse {
    #[serde(rename = "Action")]
    pub action: ResponseAction,
    #[serde(rename = "ImageData")]
    pub detail: String,
    #[serde(rename = "FileName", default)]
    pub file_name: Option<String>,
}

impl OutboundResponse {
    /// Acknowledges a completed print.
    pub fn print_success() -> Self {
        Self {
            action: ResponseAction::PrintSuccess,
            detail: PRINT_SUCCESS_DETAIL.into(),
            file_name: None,
        }
    }

    /// Reports a failure with a human-readable reason.
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            action: ResponseAction::Error,
            detail: detail.into(),
            file_name: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.action == ResponseAction::PrintSuccess
    }
}
