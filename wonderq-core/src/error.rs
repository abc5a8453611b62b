//! Error codes and the JSON error envelope

use serde::Serialize;
use thiserror::Error;

/// Error codes surfaced to queue clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Registry
    QueueAlreadyExists,
    QueueDoesNotExist,

    // Messages
    MessageNotConfirmable,

    // Requests
    InvalidParameter,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueAlreadyExists => "QueueAlreadyExists",
            Self::QueueDoesNotExist => "QueueDoesNotExist",
            Self::MessageNotConfirmable => "MessageNotConfirmable",
            Self::InvalidParameter => "InvalidParameter",
            Self::InternalError => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::QueueAlreadyExists => 409,
            Self::QueueDoesNotExist => 404,
            Self::MessageNotConfirmable | Self::InvalidParameter => 400,
            Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-facing error
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, message)
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Format as the JSON error body
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            error: &'a str,
            code: &'static str,
            #[serde(rename = "requestId")]
            request_id: &'a str,
        }

        let error = JsonError {
            error: &self.message,
            code: self.code.as_str(),
            request_id: &self.request_id,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"error":"{}","code":"{}"}}"#, self.message, self.code.as_str())
        })
    }
}
