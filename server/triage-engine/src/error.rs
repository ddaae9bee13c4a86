//! Structured error types for the triage engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("config: {field}: {reason}")]
  Config { field: String, reason: String },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("toml: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

impl EngineError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn config(field: &str, reason: &str) -> Self {
    Self::Config {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}

/// Failure of an external capability (text understanding, FAQ lookup, alert gateway).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
  #[error("timed out after {0} ms")]
  Timeout(u64),

  #[error("transport: {0}")]
  Transport(String),

  #[error("status {0}: {1}")]
  Status(u16, String),

  #[error("unparsable response: {0}")]
  Unparsable(String),

  #[error("unavailable: {0}")]
  Unavailable(String),
}

impl CapabilityError {
  /// Transient failures worth another attempt. Unparsable output and
  /// client errors other than 429 are permanent.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Timeout(_) | Self::Transport(_) => true,
      Self::Status(code, _) => *code == 429 || *code >= 500,
      Self::Unparsable(_) | Self::Unavailable(_) => false,
    }
  }
}
