//! Error taxonomy for the collection pipeline

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal pipeline failures. Any of these aborts a run before output is written.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authorization rejected by {url} (HTTP {status}); check the API token")]
    Auth { url: String, status: u16 },

    #[error("transport error on {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid input {}: {reason}", path.display())]
    Input { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn transport(url: &str, reason: impl Into<String>) -> Self {
        PipelineError::Transport {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Only transport failures are worth retrying; a rejected credential stays rejected.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Transport { .. })
    }
}

/// A canonical field that matched none of its source keys across a whole record set.
///
/// Never returned as `Err`: drifting fields are filled with empty values and reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}' matched none of its source keys ({variants}) in {records} records")]
pub struct SchemaDrift {
    pub field: &'static str,
    pub variants: String,
    pub records: usize,
}
