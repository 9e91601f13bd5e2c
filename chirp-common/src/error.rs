use crate::{model::ModelValidationError, validation::ContentError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to human readable message.
pub type FieldErrors = BTreeMap<String, String>;

/// Everything a procedure call can fail with, as it travels over the wire.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ServiceError {
    #[error("{what} was not found")]
    NotFound { what: String },
    #[error("Validation failed: {fields:?}")]
    ValidationFailed { fields: FieldErrors },
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("Network failure: {message}")]
    NetworkFailure { message: String },
    #[error("{message}")]
    Unknown { message: String },
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            fields: FieldErrors::from([(field.into(), message.into())]),
        }
    }

    pub fn unknown(message: impl ToString) -> Self {
        Self::Unknown {
            message: message.to_string(),
        }
    }

    /// The message attached to `field`, if this is a validation failure for it.
    #[must_use]
    pub fn field_message(&self, field: &str) -> Option<&str> {
        match self {
            Self::ValidationFailed { fields } => fields.get(field).map(String::as_str),
            _ => None,
        }
    }
}

impl From<ContentError> for ServiceError {
    fn from(value: ContentError) -> Self {
        Self::field("content", value.to_string())
    }
}

impl From<ModelValidationError> for ServiceError {
    fn from(value: ModelValidationError) -> Self {
        match value {
            ModelValidationError::Content(err) => err.into(),
            ModelValidationError::Username(err) => Self::field("username", err.to_string()),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Network,
    Validation,
    Unauthorized,
    NotFound,
    Unknown,
}

/// What a cache entry remembers about its last failed request.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ServiceError> for ErrorInfo {
    fn from(value: &ServiceError) -> Self {
        let kind = match value {
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::ValidationFailed { .. } => ErrorKind::Validation,
            ServiceError::Unauthenticated => ErrorKind::Unauthorized,
            ServiceError::NetworkFailure { .. } => ErrorKind::Network,
            ServiceError::Unknown { .. } => ErrorKind::Unknown,
        };

        Self {
            kind,
            message: value.to_string(),
        }
    }
}
