pub mod error;
pub mod types;
pub mod threat;
pub mod generation;
pub mod query;
pub mod vector;
pub mod sources;
pub mod retrieval;
pub mod synthesis;
pub mod history;
pub mod pipeline;

pub use error::{QuarryError, Result};
pub use types::*;
pub use threat::{ThreatAssessment, ThreatScreen, ThreatScreenConfig};
pub use generation::{ChatConfig, OpenAiChat, TextGenerator};
pub use query::{clean_query, QueryTransformer};
pub use vector::{
    document_text, EmbeddingService, FastEmbedService, IndexConfig, IndexStats, LoadOutcome,
    SimilarityIndex,
};
pub use sources::{
    ArxivConfig, ArxivSource, DuckDuckGoConfig, DuckDuckGoSource, PaperSource, WebSource,
};
pub use retrieval::{merge_documents, MultiSourceRetriever, Retrieval, RetrievalConfig, SourceFailure};
pub use synthesis::{derive_sources, Synthesis, SynthesisConfig, Synthesizer};
pub use history::ConversationCache;
pub use pipeline::{Pipeline, PipelineConfig, PipelineState, Stage, StageError};
