use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuarryError>;

#[derive(Debug, Error)]
pub enum QuarryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Feed(#[from] quick_xml::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl QuarryError {
    pub fn source_failure(source_name: impl Into<String>, reason: impl ToString) -> Self {
        QuarryError::Source {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, QuarryError::Timeout { .. })
    }
}

/// Run a capability call under a deadline. An elapsed deadline becomes
/// `QuarryError::Timeout`, so callers handle it like any other failure.
pub async fn bounded<T, F>(what: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(QuarryError::Timeout {
            what: what.to_string(),
            after: limit,
        }),
    }
}

/// Run a blocking closure (embedding, index search) on the blocking pool
/// under a deadline.
pub async fn bounded_blocking<T, F>(what: &str, limit: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let task = async move {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| QuarryError::Capability(format!("blocking task failed: {}", e)))?
    };
    bounded(what, limit, task).await
}
