//! External candidate sources.
//!
//! Sources are opaque: ranking is theirs, results may be empty, and calls
//! may fail. Callers bound and isolate every call.

mod arxiv;
mod web;

pub use arxiv::{parse_feed, ArxivConfig, ArxivSource};
pub use web::{parse_instant_answer, DuckDuckGoConfig, DuckDuckGoSource};

use crate::error::Result;
use crate::types::{Document, WebResult};
use async_trait::async_trait;

/// Structured search over a document catalogue.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Label recorded as document provenance and in failure reports.
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Document>>;
}

/// Open-web search.
#[async_trait]
pub trait WebSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>>;
}

/// Collapse runs of whitespace (feeds wrap titles across lines).
pub(crate) fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
