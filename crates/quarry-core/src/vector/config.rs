use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the similarity index
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted artifacts.
    /// `None` keeps the index in memory only.
    pub store_dir: Option<PathBuf>,

    /// Upper bound on one embedding call (single or batch).
    /// Default: 30s
    pub embed_timeout: Duration,

    /// The HNSW graph is rebuilt from stored vectors once this many
    /// entries have been appended since the last build.
    /// Default: 256
    pub graph_rebuild_after: usize,

    /// Graphs are not built for indexes smaller than this; brute force
    /// is exact and fast enough there.
    /// Default: 64
    pub min_graph_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            embed_timeout: Duration::from_secs(30),
            graph_rebuild_after: 256,
            min_graph_size: 64,
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist to (and reload from) this directory
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn with_graph_rebuild_after(mut self, n: usize) -> Self {
        self.graph_rebuild_after = n.max(1);
        self
    }

    pub fn with_min_graph_size(mut self, n: usize) -> Self {
        self.min_graph_size = n;
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.embed_timeout.is_zero() {
            return Err(crate::error::QuarryError::Validation(
                "embed_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Raise a similarity threshold to the bottom of the cosine range.
/// `None` when no score can reach it (above 1.0, or NaN).
pub(crate) fn effective_threshold(threshold: f32) -> Option<f32> {
    if threshold.is_nan() || threshold > 1.0 {
        return None;
    }
    Some(threshold.max(-1.0))
}
