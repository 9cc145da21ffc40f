//! Errors surfaced by the domain client and task router.

use petstore_core::{ErrorDescriptor, ValidationError};
use petstore_mcp::TransportError;
use thiserror::Error;

/// Errors from typed Petstore operations and task dispatch.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Caller input was rejected before anything was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The tool call could not be completed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No handler is registered for this task name.
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// The task exists but does not support this action.
    #[error("Unknown action '{action}' for task '{task}'")]
    UnknownAction { task: String, action: String },

    /// Prompt or sampling lookup failed.
    #[error(transparent)]
    Core(#[from] petstore_core::Error),

    /// The tool answered with a payload of an unexpected shape.
    #[error("Unexpected payload from '{tool}': {source}")]
    Decode {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    /// Short machine-readable code for this error.
    pub fn code(&self) -> String {
        match self {
            Self::Validation(_) => "validation_error".to_string(),
            Self::Transport(e) => e.kind().to_string(),
            Self::UnknownTask(_) => "unknown_task".to_string(),
            Self::UnknownAction { .. } => "unknown_action".to_string(),
            Self::Core(e) => e.code().to_string(),
            Self::Decode { .. } => "decode_error".to_string(),
        }
    }

    /// Project this error into a structured descriptor.
    pub fn descriptor(&self) -> ErrorDescriptor {
        match self {
            Self::Validation(e) => {
                ErrorDescriptor::new(self.code(), e.to_string()).with_detail(e.detail())
            }
            Self::Transport(e) => e.descriptor(),
            Self::Core(e) => e.descriptor(),
            Self::UnknownAction { task, action } => ErrorDescriptor::new(self.code(), self.to_string())
                .with_detail(serde_json::json!({ "task": task, "action": action })),
            Self::Decode { tool, .. } => ErrorDescriptor::new(self.code(), self.to_string())
                .with_detail(serde_json::json!({ "tool": tool })),
            Self::UnknownTask(_) => ErrorDescriptor::new(self.code(), self.to_string()),
        }
    }

    /// The offending field, for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation(e) => Some(&e.field),
            Self::Core(petstore_core::Error::Validation(e)) => Some(&e.field),
            _ => None,
        }
    }
}
