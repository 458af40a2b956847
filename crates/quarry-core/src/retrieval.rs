use crate::error::{bounded, bounded_blocking, Result};
use crate::sources::{PaperSource, WebSource};
use crate::types::{Document, WebResult};
use crate::vector::SimilarityIndex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Label used for the similarity index in failure reports.
pub const INDEX_SOURCE: &str = "vector_store";

/// Configuration for multi-source retrieval
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Results requested from the structured source.
    /// Default: 10
    pub max_documents: usize,

    /// Nearest neighbours requested from the similarity index.
    /// Default: 5
    pub recall_k: usize,

    /// Minimum cosine similarity for a recalled document.
    /// Default: 0.7
    pub similarity_threshold: f32,

    /// Default: true
    pub web_enabled: bool,

    /// Default: 5
    pub web_max_results: usize,

    /// Upper bound on each individual source call.
    /// Default: 30s
    pub source_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_documents: 10,
            recall_k: 5,
            similarity_threshold: 0.7,
            web_enabled: true,
            web_max_results: 5,
            source_timeout: Duration::from_secs(30),
        }
    }
}

impl RetrievalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_documents(mut self, n: usize) -> Self {
        self.max_documents = n;
        self
    }

    pub fn with_recall_k(mut self, k: usize) -> Self {
        self.recall_k = k;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(-1.0, 1.0);
        self
    }

    pub fn with_web(mut self, enabled: bool, max_results: usize) -> Self {
        self.web_enabled = enabled;
        self.web_max_results = max_results;
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout.max(Duration::from_millis(1));
        self
    }
}

/// One source that failed or timed out during a retrieval
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// Merged output of every source
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub documents: Vec<Document>,
    pub web_results: Vec<WebResult>,
    pub failures: Vec<SourceFailure>,
}

/// Fans a query out to the structured source, the similarity index, and
/// (optionally) the open web.
///
/// Calls run concurrently and are individually bounded. A failing source
/// contributes nothing and is reported in [`Retrieval::failures`].
pub struct MultiSourceRetriever {
    papers: Arc<dyn PaperSource>,
    index: Option<Arc<SimilarityIndex>>,
    web: Option<Arc<dyn WebSource>>,
    config: RetrievalConfig,
}

impl MultiSourceRetriever {
    pub fn new(papers: Arc<dyn PaperSource>, config: RetrievalConfig) -> Self {
        Self {
            papers,
            index: None,
            web: None,
            config,
        }
    }

    pub fn with_index(mut self, index: Arc<SimilarityIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_web(mut self, web: Arc<dyn WebSource>) -> Self {
        self.web = Some(web);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn retrieve(&self, query: &str) -> Retrieval {
        let (papers, recalled, web) =
            tokio::join!(self.search_papers(query), self.recall(query), self.search_web(query));

        let mut failures = Vec::new();
        let papers = settle(self.papers.name(), papers, &mut failures);
        let recalled = settle(INDEX_SOURCE, recalled, &mut failures);
        let web_results = match &self.web {
            Some(source) => settle(source.name(), web, &mut failures),
            None => Vec::new(),
        };

        let primary = papers.len();
        let documents = merge_documents(papers, recalled);
        log::debug!(
            "Retrieved {} documents ({} from {}, {} recalled), {} web results",
            documents.len(),
            primary,
            self.papers.name(),
            documents.len() - primary,
            web_results.len()
        );

        Retrieval {
            documents,
            web_results,
            failures,
        }
    }

    async fn search_papers(&self, query: &str) -> Result<Vec<Document>> {
        bounded(
            self.papers.name(),
            self.config.source_timeout,
            self.papers.search(query, self.config.max_documents),
        )
        .await
    }

    async fn recall(&self, query: &str) -> Result<Vec<Document>> {
        let Some(index) = &self.index else {
            return Ok(Vec::new());
        };
        if index.is_empty() || self.config.recall_k == 0 {
            return Ok(Vec::new());
        }

        let index = Arc::clone(index);
        let query = query.to_string();
        let k = self.config.recall_k;
        let threshold = self.config.similarity_threshold;

        let hits = bounded_blocking(INDEX_SOURCE, self.config.source_timeout, move || {
            index.search(&query, k, threshold)
        })
        .await?;
        Ok(hits.into_iter().map(|(doc, _)| doc).collect())
    }

    async fn search_web(&self, query: &str) -> Result<Vec<WebResult>> {
        match &self.web {
            Some(web) if self.config.web_enabled => {
                bounded(
                    web.name(),
                    self.config.source_timeout,
                    web.search(query, self.config.web_max_results),
                )
                .await
            }
            _ => Ok(Vec::new()),
        }
    }
}

fn settle<T>(source: &str, result: Result<Vec<T>>, failures: &mut Vec<SourceFailure>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            log::warn!("Source '{}' failed: {}", source, e);
            failures.push(SourceFailure {
                source: source.to_string(),
                reason: e.to_string(),
            });
            Vec::new()
        }
    }
}

/// Append recalled documents whose case-insensitive title is not already
/// among `primary`. Primary documents win; nothing else is deduplicated.
pub fn merge_documents(primary: Vec<Document>, recalled: Vec<Document>) -> Vec<Document> {
    let taken: HashSet<String> = primary.iter().map(Document::dedup_key).collect();
    let mut merged = primary;
    merged.extend(
        recalled
            .into_iter()
            .filter(|d| !taken.contains(&d.dedup_key())),
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarryError;
    use crate::types::Provenance;
    use crate::vector::{EmbeddingService, IndexConfig};
    use async_trait::async_trait;

    fn doc(title: &str, source: &str) -> Document {
        Document::new(title, vec!["Ada".into()], title, Provenance::new(source, "")).unwrap()
    }

    enum Behaviour {
        Titles(Vec<&'static str>),
        Fail,
        Hang,
    }

    struct FakePapers(Behaviour);

    #[async_trait]
    impl PaperSource for FakePapers {
        fn name(&self) -> &str {
            "arxiv"
        }

        async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<Document>> {
            match &self.0 {
                Behaviour::Titles(titles) => Ok(titles
                    .iter()
                    .take(max_results)
                    .map(|t| doc(t, "arxiv"))
                    .collect()),
                Behaviour::Fail => Err(QuarryError::source_failure("arxiv", "503")),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    struct FakeWeb(bool);

    #[async_trait]
    impl WebSource for FakeWeb {
        fn name(&self) -> &str {
            "web"
        }

        async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<WebResult>> {
            if !self.0 {
                return Err(QuarryError::source_failure("web", "offline"));
            }
            Ok(vec![WebResult {
                title: format!("About {}", query),
                url: "https://example.org".into(),
                snippet: "snippet".into(),
                source: "web".into(),
            }])
        }
    }

    /// Every text maps to the same vector, so every entry scores 1.0.
    struct ConstantEmbedder;

    impl EmbeddingService for ConstantEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "constant"
        }
    }

    fn index_with(titles: &[&str]) -> Arc<SimilarityIndex> {
        let index = SimilarityIndex::new(Arc::new(ConstantEmbedder), IndexConfig::default());
        let docs: Vec<Document> = titles.iter().map(|t| doc(t, "arxiv")).collect();
        index.insert(&docs).unwrap();
        Arc::new(index)
    }

    fn titles(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.title()).collect()
    }

    #[test]
    fn test_merge_first_writer_wins() {
        let merged = merge_documents(
            vec![doc("Paper X", "arxiv"), doc("Paper Y", "arxiv")],
            vec![doc("paper x", "vector"), doc("Paper Z", "vector")],
        );
        assert_eq!(titles(&merged), vec!["Paper X", "Paper Y", "Paper Z"]);
        assert_eq!(merged[0].provenance().source, "arxiv");
    }

    #[tokio::test]
    async fn test_retrieve_merges_sources() {
        let retriever = MultiSourceRetriever::new(
            Arc::new(FakePapers(Behaviour::Titles(vec!["Paper X", "Paper Y"]))),
            RetrievalConfig::default(),
        )
        .with_index(index_with(&["paper x", "Paper Z"]))
        .with_web(Arc::new(FakeWeb(true)));

        let out = retriever.retrieve("transformers").await;

        assert_eq!(titles(&out.documents), vec!["Paper X", "Paper Y", "Paper Z"]);
        assert!(out.documents[2].is_recalled());
        assert_eq!(out.web_results.len(), 1);
        assert!(out.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_is_isolated() {
        let retriever = MultiSourceRetriever::new(
            Arc::new(FakePapers(Behaviour::Fail)),
            RetrievalConfig::default(),
        )
        .with_index(index_with(&["Paper Z"]))
        .with_web(Arc::new(FakeWeb(false)));

        let out = retriever.retrieve("anything").await;

        assert_eq!(titles(&out.documents), vec!["Paper Z"]);
        assert!(out.web_results.is_empty());
        let failed: Vec<&str> = out.failures.iter().map(|f| f.source.as_str()).collect();
        assert_eq!(failed, vec!["arxiv", "web"]);
    }

    #[tokio::test]
    async fn test_timed_out_source_yields_empty() {
        let retriever = MultiSourceRetriever::new(
            Arc::new(FakePapers(Behaviour::Hang)),
            RetrievalConfig::default().with_source_timeout(Duration::from_millis(20)),
        )
        .with_web(Arc::new(FakeWeb(true)));

        let out = retriever.retrieve("slow").await;

        assert!(out.documents.is_empty());
        assert_eq!(out.web_results.len(), 1);
        assert_eq!(out.failures.len(), 1);
        assert!(out.failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_web_disabled_is_not_called() {
        let retriever = MultiSourceRetriever::new(
            Arc::new(FakePapers(Behaviour::Titles(vec!["A"]))),
            RetrievalConfig::default().with_web(false, 5),
        )
        .with_web(Arc::new(FakeWeb(false)));

        let out = retriever.retrieve("q").await;
        assert!(out.web_results.is_empty());
        assert!(out.failures.is_empty());
    }

    #[tokio::test]
    async fn test_structured_source_limit() {
        let retriever = MultiSourceRetriever::new(
            Arc::new(FakePapers(Behaviour::Titles(vec!["A", "B", "C"]))),
            RetrievalConfig::default().with_max_documents(2),
        );
        let out = retriever.retrieve("q").await;
        assert_eq!(out.documents.len(), 2);
    }
}
