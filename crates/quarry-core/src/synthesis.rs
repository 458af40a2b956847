use crate::error::{bounded, QuarryError, Result};
use crate::generation::TextGenerator;
use crate::types::{Document, ResearchResult, Severity, WebResult};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Source label for results produced by the security short-circuit.
pub const BLOCKED_SOURCE: &str = "security_analysis";
/// Source label present when any document was recalled from the index.
pub const INDEX_LABEL: &str = "vector_store";
/// Source label present when the open web contributed results.
pub const WEB_LABEL: &str = "web_search";

/// Limits on what goes into a synthesis request
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Default: 5
    pub max_documents: usize,
    /// Default: 3
    pub max_web_results: usize,
    /// Authors listed per document. Default: 2
    pub max_authors: usize,
    /// Default: 60s
    pub timeout: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_documents: 5,
            max_web_results: 3,
            max_authors: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Output of one synthesis: the summary text, the result built from it,
/// and the reason generation failed, if it did.
#[derive(Debug)]
pub struct Synthesis {
    pub summary: String,
    pub result: ResearchResult,
    pub failure: Option<QuarryError>,
}

/// Aggregates retrieved items into a [`ResearchResult`] and a summary.
pub struct Synthesizer {
    generator: Option<Arc<dyn TextGenerator>>,
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: SynthesisConfig) -> Self {
        Self {
            generator: Some(generator),
            config,
        }
    }

    /// A synthesizer that reports generation as unavailable.
    pub fn without_generator(config: SynthesisConfig) -> Self {
        Self {
            generator: None,
            config,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Always returns a result built from whatever is available.
    pub async fn synthesize(
        &self,
        documents: &[Document],
        web_results: &[WebResult],
        query: &str,
    ) -> Synthesis {
        let (summary, failure) = if documents.is_empty() && web_results.is_empty() {
            (format!("No documents found for \"{}\".", query), None)
        } else {
            match self.generate(documents, web_results, query).await {
                Ok(summary) => (summary, None),
                Err(e) => {
                    log::warn!("Summary generation failed: {}", e);
                    (format!("Error generating summary: {}", e), Some(e))
                }
            }
        };

        let result = ResearchResult {
            documents: documents.to_vec(),
            total_found: documents.len(),
            query: query.to_string(),
            elapsed_secs: 0.0,
            sources: derive_sources(documents, web_results),
            summary: Some(summary.clone()),
            error: failure.as_ref().map(ToString::to_string),
        };

        Synthesis {
            summary,
            result,
            failure,
        }
    }

    /// The degraded result for input the threat screen rejected.
    pub fn blocked(&self, severity: Severity, threats: &[String], query: &str) -> Synthesis {
        let mut summary = format!(
            "Security analysis detected a {} level threat in the query. \
             The query has been sanitized and processed safely. \
             No research results were generated due to security concerns.",
            severity
        );
        if !threats.is_empty() {
            let _ = write!(summary, " ({} threat indicator(s) matched.)", threats.len());
        }

        let result = ResearchResult {
            documents: Vec::new(),
            total_found: 0,
            query: query.to_string(),
            elapsed_secs: 0.0,
            sources: vec![BLOCKED_SOURCE.to_string()],
            summary: Some(summary.clone()),
            error: None,
        };

        Synthesis {
            summary,
            result,
            failure: None,
        }
    }

    async fn generate(
        &self,
        documents: &[Document],
        web_results: &[WebResult],
        query: &str,
    ) -> Result<String> {
        let generator = self.generator.as_ref().ok_or_else(|| {
            QuarryError::Capability("text generation is not configured".to_string())
        })?;

        let prompt = self.build_prompt(documents, web_results, query);
        bounded("summary generation", self.config.timeout, generator.complete(&prompt)).await
    }

    fn build_prompt(&self, documents: &[Document], web_results: &[WebResult], query: &str) -> String {
        let mut prompt = format!(
            "Write a research summary for the query: \"{}\"\n",
            query
        );

        if !documents.is_empty() {
            let _ = write!(prompt, "\nResearch papers found ({}):\n", documents.len());
            for (i, doc) in documents.iter().take(self.config.max_documents).enumerate() {
                let authors = doc
                    .authors()
                    .iter()
                    .take(self.config.max_authors)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(prompt, "{}. {} - {}", i + 1, doc.title(), authors);
            }
        }

        if !web_results.is_empty() {
            let _ = write!(prompt, "\nWeb results found ({}):\n", web_results.len());
            for (i, hit) in web_results.iter().take(self.config.max_web_results).enumerate() {
                let _ = writeln!(prompt, "{}. {}", i + 1, hit.title);
            }
        }

        prompt.push_str(
            "\nThe summary should:\n\
             1. Synthesize findings across all sources\n\
             2. Identify key research themes and trends\n\
             3. Highlight important contributions and methods\n\
             4. Discuss implications and open directions\n\
             Use clear sections.",
        );
        prompt
    }
}

/// Which data categories contributed, derived from what is non-empty:
/// the provenance of directly retrieved documents (first-seen order), then
/// [`INDEX_LABEL`] if any document was recalled, then [`WEB_LABEL`] if
/// there are web results.
pub fn derive_sources(documents: &[Document], web_results: &[WebResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for doc in documents.iter().filter(|d| !d.is_recalled()) {
        let source = &doc.provenance().source;
        if !sources.contains(source) {
            sources.push(source.clone());
        }
    }
    if documents.iter().any(Document::is_recalled) {
        sources.push(INDEX_LABEL.to_string());
    }
    if !web_results.is_empty() {
        sources.push(WEB_LABEL.to_string());
    }
    sources
}
