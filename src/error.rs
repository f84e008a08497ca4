//! Typed failures that callers need to tell apart.
//!
//! Most of the crate propagates [`anyhow::Error`]; the variants here are the
//! ones a command (or a test) inspects with `downcast_ref` to decide what to
//! report.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("{0} is not set")]
    MissingSetting(&'static str),

    #[error("model access token is not valid: {0}")]
    InvalidCredentials(String),

    #[error("rate-limit header '{0}' missing or not a number")]
    RateLimitHeader(&'static str),

    #[error("persisted index at {path} is unusable: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("model endpoint returned {status}: {body}")]
    ModelCall { status: u16, body: String },

    #[error("git clone failed: {0}")]
    CloneFailed(String),
}

impl RagError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
