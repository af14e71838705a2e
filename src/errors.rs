use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds that callers branch on. Everything else travels as a plain
/// anyhow chain; these are attached to the chain and recovered with
/// `downcast_ref` where the distinction matters (retry vs misconfigured vs
/// skip).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("secret detected in {}: {reason}", path.display())]
    SecretDetected { path: PathBuf, reason: String },

    #[error("not inside a git repository")]
    NotInRepo,

    #[error("{failed} of {total} mirror jobs failed")]
    PartialBatchFailure { failed: usize, total: usize },
}
