//! Invocation results returned by every layer of the client stack.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys under which a record list may be wrapped in an object payload.
const RECORD_LIST_KEYS: &[&str] = &["pets", "records", "items"];

/// Structured description of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Machine-readable error code (e.g. `validation_error`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorDescriptor {
    /// Create a new descriptor.
    ///
    /// Neither `code` nor `message` is ever left empty: a blank code becomes
    /// `unknown_error` and a blank message repeats the code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut code = code.into();
        if code.trim().is_empty() {
            code = "unknown_error".to_string();
        }
        let mut message = message.into();
        if message.trim().is_empty() {
            message = code.clone();
        }
        Self {
            code,
            message,
            detail: None,
        }
    }

    /// Attach structured detail.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl std::fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of one tool invocation.
///
/// Immutable once built. A result with `success == false` always carries an
/// error descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    success: bool,
    payload: Value,
    summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDescriptor>,
}

impl InvocationResult {
    /// A successful result.
    pub fn success(payload: Value, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            payload,
            summary: summary.into(),
            error: None,
        }
    }

    /// A failed result with its descriptor.
    pub fn failure(error: ErrorDescriptor, summary: impl Into<String>) -> Self {
        let summary = summary.into();
        let summary = if summary.is_empty() {
            error.message.clone()
        } else {
            summary
        };
        Self {
            success: false,
            payload: Value::Null,
            summary,
            error: Some(error),
        }
    }

    /// Whether the invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Structured payload (`null` when the tool returned none).
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Human-readable summary text.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Error descriptor for failed results.
    pub fn error(&self) -> Option<&ErrorDescriptor> {
        self.error.as_ref()
    }

    /// Consume the result, returning its payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Reshape the payload into a list of typed records.
    ///
    /// Accepts either a bare array or an object wrapping the array under
    /// `pets`, `records` or `items`. A `null` payload yields an empty list.
    pub fn records<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        let list = match &self.payload {
            Value::Null => return Ok(Vec::new()),
            Value::Array(_) => self.payload.clone(),
            Value::Object(map) => RECORD_LIST_KEYS
                .iter()
                .find_map(|key| map.get(*key).filter(|v| v.is_array()))
                .cloned()
                .unwrap_or_else(|| Value::Array(vec![self.payload.clone()])),
            other => other.clone(),
        };
        serde_json::from_value(list)
    }

    /// Reshape the payload into a single typed record.
    pub fn record<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
