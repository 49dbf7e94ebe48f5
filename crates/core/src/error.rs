use serde::{Deserialize, Serialize};

/// Failures a resource client call can report.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("certificate trust: {url}: {message}")]
    CertificateTrust { url: String, message: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid: {0}")]
    Invalid(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Errors worth repeating a write for.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout(_) | ClientError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict(_))
    }

    /// URL that failed TLS trust, if this is a certificate error.
    pub fn certificate_url(&self) -> Option<&str> {
        match self {
            ClientError::CertificateTrust { url, .. } => Some(url),
            _ => None,
        }
    }
}
