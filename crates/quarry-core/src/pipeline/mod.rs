//! The research pipeline: a fixed sequence of stages with one branch.
//!
//! ```text
//! Screening --safe--> Transforming --> Retrieving --> Synthesizing --> Completed
//!     |                                                   ^
//!     +-----------------------unsafe----------------------+
//! ```
//!
//! Stages fail forward. A stage that cannot do its work records a
//! [`StageError`] on the [`PipelineState`] and leaves a fallback value for
//! the next stage; only a setup failure ends a run early, and even that
//! produces a structurally valid [`ResearchResult`].

mod stage;
mod state;

pub use stage::{Stage, StageError};
pub use state::PipelineState;

use crate::error::{bounded_blocking, QuarryError, Result};
use crate::query::QueryTransformer;
use crate::retrieval::MultiSourceRetriever;
use crate::synthesis::Synthesizer;
use crate::threat::ThreatScreen;
use crate::types::{Document, Message, ResearchResult};
use crate::vector::SimilarityIndex;
use std::sync::Arc;
use std::time::Instant;

/// What the pipeline does with retrieved documents.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Add newly retrieved documents to the similarity index.
    /// Default: true
    pub remember_results: bool,

    /// Persist the index after remembering documents.
    /// Default: true
    pub persist_on_write: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remember_results: true,
            persist_on_write: true,
        }
    }
}

/// Runs queries through screening, transformation, retrieval and synthesis.
///
/// Components are injected; a `Pipeline` holds no per-run state and can
/// serve concurrent runs.
pub struct Pipeline {
    screen: ThreatScreen,
    transformer: QueryTransformer,
    retriever: MultiSourceRetriever,
    synthesizer: Synthesizer,
    index: Option<Arc<SimilarityIndex>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        screen: ThreatScreen,
        transformer: QueryTransformer,
        retriever: MultiSourceRetriever,
        synthesizer: Synthesizer,
    ) -> Self {
        Self {
            screen,
            transformer,
            retriever,
            synthesizer,
            index: None,
            config: PipelineConfig::default(),
        }
    }

    /// Remember retrieved documents in `index`, as directed by `config`.
    pub fn with_memory(mut self, index: Arc<SimilarityIndex>, config: PipelineConfig) -> Self {
        self.index = Some(index);
        self.config = config;
        self
    }

    pub fn screen(&self) -> &ThreatScreen {
        &self.screen
    }

    pub fn index(&self) -> Option<&Arc<SimilarityIndex>> {
        self.index.as_ref()
    }

    /// Run one query to completion. Never fails: every problem is reported
    /// through [`ResearchResult::error`].
    pub async fn run(&self, query: &str, history: &[Message]) -> ResearchResult {
        let started = Instant::now();
        let result = match self.execute(query, history).await {
            Ok(state) => state.into_result(),
            Err(e) => {
                log::error!("Pipeline setup failed: {}", e);
                ResearchResult::failed(query, e.to_string())
            }
        };
        result.with_elapsed(started.elapsed())
    }

    /// Run one query and return the full state record. Fails only when the
    /// run cannot start.
    pub async fn execute(&self, query: &str, history: &[Message]) -> Result<PipelineState> {
        if query.trim().is_empty() {
            return Err(QuarryError::Validation("query must not be empty".to_string()));
        }

        let mut state = PipelineState::new(query, history.to_vec());
        let mut stage = Stage::INITIAL;

        while !stage.is_terminal() {
            state.stage = stage;
            log::debug!("Entering stage {}", stage);

            match stage {
                Stage::Screening => self.screen_input(&mut state),
                Stage::Transforming => self.transform_query(&mut state).await,
                Stage::Retrieving => self.retrieve(&mut state).await,
                Stage::Synthesizing => self.synthesize(&mut state).await,
                Stage::Completed => {}
            }

            stage = stage.next(state.safe);
        }
        state.stage = stage;

        Ok(state)
    }

    fn screen_input(&self, state: &mut PipelineState) {
        let assessment = self.screen.classify(&state.raw_input);

        if let Some(reason) = &assessment.error {
            state.record_failure(StageError::failed(Stage::Screening, reason));
        }
        if !assessment.safe {
            log::warn!(
                "Input blocked: severity={} threats={:?}",
                assessment.severity,
                assessment.threats
            );
        }

        state.safe = assessment.safe;
        state.severity = assessment.severity;
        state.threats = assessment.threats;
        state.sanitized_input = assessment.sanitized;
    }

    async fn transform_query(&self, state: &mut PipelineState) {
        state.retrieval_query = match self
            .transformer
            .try_transform(&state.sanitized_input, &state.history)
            .await
        {
            Ok(query) => query,
            Err(e) => {
                state.record_failure(StageError::from_error(Stage::Transforming, &e));
                state.sanitized_input.clone()
            }
        };
    }

    async fn retrieve(&self, state: &mut PipelineState) {
        let retrieval = self.retriever.retrieve(&state.retrieval_query).await;

        for failure in &retrieval.failures {
            state.record_failure(StageError::failed(Stage::Retrieving, failure));
        }

        self.remember(&retrieval.documents).await;

        state.documents = retrieval.documents;
        state.web_results = retrieval.web_results;
    }

    /// Index directly retrieved documents. Failures are logged only.
    async fn remember(&self, documents: &[Document]) {
        let Some(index) = &self.index else {
            return;
        };
        if !self.config.remember_results {
            return;
        }

        let fresh: Vec<Document> = documents
            .iter()
            .filter(|d| !d.is_recalled())
            .cloned()
            .collect();
        if fresh.is_empty() {
            return;
        }

        let persist = self.config.persist_on_write;
        let timeout = index.config().embed_timeout;
        let index = Arc::clone(index);

        let outcome = bounded_blocking("index write", timeout, move || {
            let added = index.remember(&fresh)?;
            if added > 0 && persist {
                index.persist()?;
            }
            Ok(added)
        })
        .await;

        match outcome {
            Ok(0) => {}
            Ok(added) => log::info!("Indexed {} new documents", added),
            Err(e) => log::warn!("Failed to index retrieved documents: {}", e),
        }
    }

    async fn synthesize(&self, state: &mut PipelineState) {
        let synthesis = if state.safe {
            let synthesis = self
                .synthesizer
                .synthesize(&state.documents, &state.web_results, &state.retrieval_query)
                .await;
            if let Some(e) = &synthesis.failure {
                state.record_failure(StageError::from_error(Stage::Synthesizing, e));
            }
            synthesis
        } else {
            self.synthesizer
                .blocked(state.severity, &state.threats, &state.sanitized_input)
        };

        state.summary = synthesis.summary;
        state.result = Some(synthesis.result);
    }
}
