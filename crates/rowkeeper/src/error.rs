use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the shopping backend collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
  #[error("Sign in required")]
  AuthRequired,

  #[error("{resource} not found")]
  NotFound { resource: String },

  #[error("Request rejected (HTTP {status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("Request failed: {message}")]
  Transport { message: String },

  #[error("Unexpected response: {message}")]
  Decode { message: String },
}

impl BackendError {
  pub fn not_found(resource: impl Into<String>) -> Self {
    Self::NotFound { resource: resource.into() }
  }

  pub fn rejected(status: u16, message: impl Into<String>) -> Self {
    Self::Rejected { status, message: message.into() }
  }

  pub fn transport(message: impl Into<String>) -> Self {
    Self::Transport { message: message.into() }
  }

  pub fn decode(message: impl Into<String>) -> Self {
    Self::Decode { message: message.into() }
  }

  pub fn is_auth_required(&self) -> bool {
    matches!(self, Self::AuthRequired)
  }
}

impl From<reqwest::Error> for BackendError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Self::decode(err.to_string())
    } else if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
      Self::AuthRequired
    } else {
      Self::transport(err.to_string())
    }
  }
}

impl From<tokio::time::error::Elapsed> for BackendError {
  fn from(_: tokio::time::error::Elapsed) -> Self {
    Self::transport("request timed out")
  }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read { path: PathBuf, source: std::io::Error },

  #[error("Failed to parse config {path}: {source}")]
  Parse { path: PathBuf, source: serde_json::Error },

  #[error("Failed to write config {path}: {source}")]
  Write { path: PathBuf, source: std::io::Error },

  #[error("Invalid config: {message}")]
  Invalid { message: String },
}

impl ConfigError {
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::Invalid { message: message.into() }
  }
}

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("Failed to access session file {path}: {source}")]
  Io { path: PathBuf, source: std::io::Error },
}
