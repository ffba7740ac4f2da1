//! Tagged operation results.
//!
//! Every reader operation hands back either `{"success": true, ...payload}`
//! or `{"success": false, "error": "...", ...diagnostics}`. Errors never
//! cross this boundary as `Err`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Error;

/// Result of a public reader operation.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The operation produced a payload.
    Success(T),
    /// The operation failed; the failure is data, not an exception.
    Failure(Failure),
}

/// Structured failure with optional diagnostic fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// Human-readable reason.
    pub error: String,
    /// Failure class (`not_found`, `ambiguous`, `external_command`, ...).
    pub kind: &'static str,
    /// Extra fields merged into the serialized object.
    pub details: Map<String, Value>,
}

impl Failure {
    /// Create a failure with no diagnostics.
    pub fn new(kind: &'static str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind,
            details: Map::new(),
        }
    }

    /// Attach a diagnostic field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("success".into(), Value::Bool(false));
        object.insert("error".into(), Value::String(self.error.clone()));
        object.insert("kind".into(), Value::String(self.kind.into()));
        for (key, value) in &self.details {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        let failure = Failure::new(err.kind(), err.to_string());
        match err {
            Error::FileNotFound { path } => {
                failure.with("path", path.display().to_string())
            }
            Error::NotFound { known, .. } => failure.with("knownNames", known),
            Error::Ambiguous { candidates, .. } => failure.with("candidates", candidates),
            Error::CommandFailed { command, .. }
            | Error::CommandTimeout { command, .. }
            | Error::OutputTooLarge { command, .. } => failure.with("command", command),
            _ => failure,
        }
    }
}

impl<T: Serialize> Outcome<T> {
    /// Fold an internal result into an outcome.
    pub fn from_result(result: crate::Result<T>) -> Self {
        match result {
            Ok(payload) => Outcome::Success(payload),
            Err(err) => Outcome::Failure(err.into()),
        }
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The success payload, if any.
    pub fn payload(&self) -> Option<&T> {
        match self {
            Outcome::Success(payload) => Some(payload),
            Outcome::Failure(_) => None,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    /// Render as the tagged JSON object.
    ///
    /// Payloads that serialize to an object are flattened next to
    /// `success`; anything else lands under `result`.
    pub fn to_value(&self) -> Value {
        match self {
            Outcome::Failure(failure) => failure.to_value(),
            Outcome::Success(payload) => {
                let mut object = Map::new();
                object.insert("success".into(), Value::Bool(true));
                match serde_json::to_value(payload) {
                    Ok(Value::Object(fields)) => object.extend(fields),
                    Ok(other) => {
                        object.insert("result".into(), other);
                    }
                    Err(err) => {
                        return Failure::from(Error::from(err)).to_value();
                    }
                }
                Value::Object(object)
            }
        }
    }
}
