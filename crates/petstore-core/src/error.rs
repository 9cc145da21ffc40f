//! Error types shared by every layer of the client.
//!
//! Errors here are caller programming errors or bad input. None of them are
//! ever retried.

use thiserror::Error;

use crate::invocation::ErrorDescriptor;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the core crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller input failed validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// No prompt template registered under this name.
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    /// No sampling preset registered under this name.
    #[error("Unknown sampling preset: {0}")]
    UnknownPreset(String),

    /// A template placeholder had no matching argument.
    #[error("Template '{template}' is missing a value for placeholder '{field}'")]
    MissingPlaceholder { template: String, field: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Validation(_) => "validation_error",
            Error::UnknownTemplate(_) => "unknown_template",
            Error::UnknownPreset(_) => "unknown_preset",
            Error::MissingPlaceholder { .. } => "missing_placeholder",
            Error::Json(_) => "json_error",
        }
    }

    /// Project this error into a structured descriptor.
    pub fn descriptor(&self) -> ErrorDescriptor {
        let descriptor = ErrorDescriptor::new(self.code(), self.to_string());
        match self {
            Error::Validation(e) => descriptor.with_detail(e.detail()),
            Error::MissingPlaceholder { template, field } => descriptor.with_detail(
                serde_json::json!({ "template": template, "field": field }),
            ),
            _ => descriptor,
        }
    }
}

/// Bad caller input, reported with the offending field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation error on '{field}': {reason}")]
pub struct ValidationError {
    /// Name of the offending field, as it appears on the wire.
    pub field: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Field is absent.
    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "is required")
    }

    /// Field is present but empty.
    pub fn empty(field: impl Into<String>) -> Self {
        Self::new(field, "must not be empty")
    }

    /// Structured detail for an [`ErrorDescriptor`].
    pub fn detail(&self) -> serde_json::Value {
        serde_json::json!({ "field": self.field, "reason": self.reason })
    }
}
