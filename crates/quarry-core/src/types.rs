use crate::error::{QuarryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Type alias for embedding vectors
pub type Embedding = Vec<f32>;

/// A retrieved item: a paper, article, or recalled index entry.
///
/// Documents are immutable once constructed. Enrichment (attaching a
/// similarity score) returns a new value via [`Document::with_similarity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Display title. Identity for deduplication, compared case-insensitively.
    title: String,

    /// Author names. Never empty.
    authors: Vec<String>,

    /// Abstract or snippet text.
    #[serde(rename = "abstract")]
    abstract_text: String,

    /// Where this document came from.
    provenance: Provenance,

    /// Publication timestamp, when the source reports one.
    #[serde(default)]
    published: Option<DateTime<Utc>>,

    /// Topic tags (e.g. arXiv categories).
    #[serde(default)]
    tags: Vec<String>,

    /// Cosine similarity to the query. Set only on documents recalled
    /// from the similarity index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    similarity_score: Option<f32>,
}

/// Origin of a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    /// Source label, e.g. "arxiv".
    pub source: String,

    /// Canonical link to the document. May be empty.
    pub url: String,
}

impl Provenance {
    pub fn new(source: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
        }
    }
}

impl Document {
    /// Create a document. Fails if the title is blank or no author is given.
    pub fn new(
        title: impl Into<String>,
        authors: Vec<String>,
        abstract_text: impl Into<String>,
        provenance: Provenance,
    ) -> Result<Self> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(QuarryError::Validation("Document title is empty".to_string()));
        }

        let authors: Vec<String> = authors
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if authors.is_empty() {
            return Err(QuarryError::Validation(format!(
                "Document '{}' has no authors",
                title
            )));
        }

        Ok(Self {
            title,
            authors,
            abstract_text: abstract_text.into(),
            provenance,
            published: None,
            tags: Vec::new(),
            similarity_score: None,
        })
    }

    pub fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// A copy of this document carrying a similarity score.
    pub fn with_similarity(&self, score: f32) -> Self {
        Self {
            similarity_score: Some(score),
            ..self.clone()
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn abstract_text(&self) -> &str {
        &self.abstract_text
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn similarity_score(&self) -> Option<f32> {
        self.similarity_score
    }

    /// True if this document was surfaced by the similarity index.
    pub fn is_recalled(&self) -> bool {
        self.similarity_score.is_some()
    }

    /// Deduplication key: the lowercased title.
    pub fn dedup_key(&self) -> String {
        self.title.to_lowercase()
    }
}

/// An open-web search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Which engine or feed produced the hit.
    pub source: String,
}

/// Threat severity tiers, ordered none < low < medium < high < critical
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who authored a conversation message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Externally visible outcome of one pipeline run.
///
/// Built once per run. The only later change is the elapsed-time backfill
/// done by the top-level caller through [`ResearchResult::with_elapsed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchResult {
    /// Documents actually surfaced.
    pub documents: Vec<Document>,

    /// Number of documents found.
    pub total_found: usize,

    /// The query that produced this result.
    pub query: String,

    /// Wall-clock time of the run, in seconds.
    pub elapsed_secs: f64,

    /// Which data categories contributed.
    pub sources: Vec<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

impl ResearchResult {
    /// A structurally valid result for a run that could not start.
    pub fn failed(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            documents: Vec::new(),
            total_found: 0,
            query: query.into(),
            elapsed_secs: 0.0,
            sources: Vec::new(),
            summary: None,
            error: Some(error.into()),
        }
    }

    pub fn with_elapsed(self, elapsed: Duration) -> Self {
        Self {
            elapsed_secs: elapsed.as_secs_f64(),
            ..self
        }
    }
}
