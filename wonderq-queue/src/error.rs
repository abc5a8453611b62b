//! Queue and registry errors

use thiserror::Error;
use wonderq_core::{ApiError, ErrorCode};

use crate::message::MessageId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue with name {0} already exists")]
    AlreadyExists(String),
    #[error("Queue with name {0} doesn't exist")]
    NotFound(String),
    #[error("Message with ID {0} is not available for confirm")]
    NotConfirmable(MessageId),
}

impl QueueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyExists(_) => ErrorCode::QueueAlreadyExists,
            Self::NotFound(_) => ErrorCode::QueueDoesNotExist,
            Self::NotConfirmable(_) => ErrorCode::MessageNotConfirmable,
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}
