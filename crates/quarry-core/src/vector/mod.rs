mod config;
mod embedding;
mod index;
mod store;

pub use config::IndexConfig;
pub use embedding::{document_text, l2_normalize, EmbeddingService, FastEmbedService};
pub use index::{IndexStats, LoadOutcome, SimilarityIndex};
pub use store::{DOCUMENTS_FILE, VECTORS_FILE};
