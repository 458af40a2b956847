use super::stage::{Stage, StageError};
use crate::types::{Document, Message, ResearchResult, Severity, WebResult};

/// The record threaded through one run. Each run owns its own instance.
///
/// Fields are grouped by the stage that owns them. Until a stage runs, its
/// fields hold empty defaults, which downstream stages read as "no data".
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub raw_input: String,
    pub history: Vec<Message>,

    // screening
    pub sanitized_input: String,
    pub safe: bool,
    pub severity: Severity,
    pub threats: Vec<String>,

    // transforming
    pub retrieval_query: String,

    // retrieving
    pub documents: Vec<Document>,
    pub web_results: Vec<WebResult>,

    // synthesizing
    pub summary: String,
    pub result: Option<ResearchResult>,

    /// Failures from any stage, in the order they happened.
    pub failures: Vec<StageError>,

    /// Last stage entered. Diagnostics only; routing never reads it.
    pub stage: Stage,
}

impl PipelineState {
    pub fn new(raw_input: impl Into<String>, history: Vec<Message>) -> Self {
        Self {
            raw_input: raw_input.into(),
            history,
            sanitized_input: String::new(),
            safe: false,
            severity: Severity::None,
            threats: Vec::new(),
            retrieval_query: String::new(),
            documents: Vec::new(),
            web_results: Vec::new(),
            summary: String::new(),
            result: None,
            failures: Vec::new(),
            stage: Stage::INITIAL,
        }
    }

    pub fn record_failure(&mut self, failure: StageError) {
        log::warn!("Stage failure: {}", failure);
        self.failures.push(failure);
    }

    /// All failures joined into one message, or `None` if there were none.
    pub fn error(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Final result of the run, carrying every recorded failure.
    pub fn into_result(self) -> ResearchResult {
        let error = self.error();
        match self.result {
            Some(result) => ResearchResult {
                error: error.or(result.error.clone()),
                ..result
            },
            None => ResearchResult::failed(
                self.retrieval_query,
                error.unwrap_or_else(|| "pipeline produced no result".to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fresh_state_is_empty() {
        let state = PipelineState::new("q", Vec::new());
        assert!(state.documents.is_empty());
        assert!(state.summary.is_empty());
        assert!(state.error().is_none());
        assert_eq!(state.stage, Stage::Screening);
    }

    #[test]
    fn test_failures_are_joined_in_order() {
        let mut state = PipelineState::new("q", Vec::new());
        state.record_failure(StageError::failed(Stage::Retrieving, "arxiv: 503"));
        state.record_failure(StageError::Timeout {
            stage: Stage::Synthesizing,
            after: Duration::from_secs(1),
        });

        assert_eq!(
            state.error().unwrap(),
            "retrieving failed: arxiv: 503; synthesizing timed out after 1s"
        );
    }

    #[test]
    fn test_into_result_keeps_result_and_adds_error() {
        let mut state = PipelineState::new("q", Vec::new());
        state.result = Some(ResearchResult {
            documents: Vec::new(),
            total_found: 0,
            query: "q".into(),
            elapsed_secs: 0.0,
            sources: vec!["arxiv".into()],
            summary: Some("s".into()),
            error: None,
        });
        state.record_failure(StageError::failed(Stage::Transforming, "x"));

        let result = state.into_result();
        assert_eq!(result.summary.as_deref(), Some("s"));
        assert_eq!(result.error.as_deref(), Some("transforming failed: x"));
    }

    #[test]
    fn test_into_result_without_result() {
        let result = PipelineState::new("q", Vec::new()).into_result();
        assert_eq!(result.total_found, 0);
        assert!(result.error.is_some());
    }
}
