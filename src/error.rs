//! Error taxonomy for a single app's update run.
//!
//! Every variant is attributed to exactly one app. The batch driver logs it,
//! records it in the app's outcome and moves on to the next app.

use crate::github::GitHubError;
use crate::hooks::HookError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Malformed app entry or an invalid pattern.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] GitHubError),

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("no matching asset found for {0}")]
    NoMatch(String),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UpdateError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdateError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Short category name used in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateError::Config(_) => "config",
            UpdateError::Api(_) | UpdateError::Download { .. } => "network",
            UpdateError::NoMatch(_) => "no-match",
            UpdateError::Hook(_) => "hook",
            UpdateError::Io { .. } => "io",
        }
    }
}
