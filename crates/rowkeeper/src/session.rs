//! Cached credential
//!
//! Only the presence of a token matters here; how it was obtained is the
//! backend's concern. The token may come from the environment or a session
//! file, and is forgotten (file included) when the backend reports that the
//! session is no longer valid.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::rowkeeper_home;
use crate::error::SessionError;

pub const SESSION_TOKEN_ENV: &str = "ROWKEEPER_SESSION_TOKEN";
const SESSION_FILE: &str = "session";

#[derive(Debug, Clone, Default)]
pub struct Session {
  token: Arc<RwLock<Option<String>>>,
  path: Option<PathBuf>,
}

impl Session {
  pub fn anonymous() -> Self {
    Self::default()
  }

  pub fn with_token(token: impl Into<String>) -> Self {
    Self { token: Arc::new(RwLock::new(Some(token.into()))), path: None }
  }

  /// Read the token stored at `path`; a missing file means anonymous
  pub fn load(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
    let path = path.into();
    let token = match std::fs::read_to_string(&path) {
      Ok(content) => Some(content.trim().to_string()).filter(|token| !token.is_empty()),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
      Err(source) => return Err(SessionError::Io { path, source }),
    };
    Ok(Self { token: Arc::new(RwLock::new(token)), path: Some(path) })
  }

  /// `ROWKEEPER_SESSION_TOKEN` wins over the session file
  pub fn load_default() -> Result<Self, SessionError> {
    let path = session_path();
    if let Ok(token) = std::env::var(SESSION_TOKEN_ENV) {
      if !token.trim().is_empty() {
        return Ok(Self { token: Arc::new(RwLock::new(Some(token.trim().to_string()))), path });
      }
    }
    match path {
      Some(path) => Self::load(path),
      None => Ok(Self::anonymous()),
    }
  }

  pub fn token(&self) -> Option<String> {
    self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn is_logged_in(&self) -> bool {
    self.token.read().unwrap_or_else(PoisonError::into_inner).is_some()
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  /// Remember a token, persisting it when the session is file-backed
  pub fn store(&self, token: impl Into<String>) -> Result<(), SessionError> {
    let token = token.into();
    if let Some(path) = &self.path {
      if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
          .map_err(|source| SessionError::Io { path: parent.to_path_buf(), source })?;
      }
      std::fs::write(path, &token).map_err(|source| SessionError::Io { path: path.clone(), source })?;
    }
    *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    Ok(())
  }

  /// Forget the credential. Failing to delete the file is logged, not raised.
  pub fn clear(&self) {
    *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;

    if let Some(path) = &self.path {
      match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "cleared cached session"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to remove session file"),
      }
    }
  }
}

pub fn session_path() -> Option<PathBuf> {
  rowkeeper_home().map(|home| home.join(SESSION_FILE))
}
