use crate::error::{QuarryError, Result};
use crate::types::{Document, Embedding};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding as FastEmbedModel};

/// Service for generating text embeddings
pub trait EmbeddingService: Send + Sync {
    /// Generate embedding for a single text.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Batch embedding. Output order matches input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embedding dimension for the current model.
    fn dimension(&self) -> usize;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

/// FastEmbed-based embedding service
pub struct FastEmbedService {
    model: FastEmbedModel,
    model_name: String,
    dimension: usize,
}

impl FastEmbedService {
    /// Create a new FastEmbed service with the default model
    pub fn new() -> Result<Self> {
        Self::with_model(EmbeddingModel::BGESmallENV15)
    }

    /// Resolve a model by its config name (e.g. "bge-small-en-v1.5").
    pub fn from_name(name: &str) -> Result<Self> {
        let model = match name.to_lowercase().as_str() {
            "bge-small-en-v1.5" | "bgesmallenv15" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" | "bgebaseenv15" => EmbeddingModel::BGEBaseENV15,
            "bge-large-en-v1.5" | "bgelargeenv15" => EmbeddingModel::BGELargeENV15,
            "all-minilm-l6-v2" | "allminilml6v2" => EmbeddingModel::AllMiniLML6V2,
            "all-minilm-l12-v2" | "allminilml12v2" => EmbeddingModel::AllMiniLML12V2,
            other => {
                return Err(QuarryError::Capability(format!(
                    "Unknown embedding model '{}'",
                    other
                )))
            }
        };
        Self::with_model(model)
    }

    /// Create a new FastEmbed service with a specific model
    pub fn with_model(model: EmbeddingModel) -> Result<Self> {
        let init_options = InitOptions::new(model.clone());

        let fastembed_model = FastEmbedModel::try_new(init_options)
            .map_err(|e| QuarryError::Capability(format!("Failed to initialize FastEmbed: {}", e)))?;

        let model_name = format!("{:?}", model);
        let dimension = match model {
            EmbeddingModel::BGESmallENV15 => 384,
            EmbeddingModel::BGEBaseENV15 => 768,
            EmbeddingModel::BGELargeENV15 => 1024,
            EmbeddingModel::AllMiniLML6V2 => 384,
            EmbeddingModel::AllMiniLML12V2 => 384,
            _ => 384,
        };

        log::info!("Loaded embedding model {} ({}d)", model_name, dimension);

        Ok(Self {
            model: fastembed_model,
            model_name,
            dimension,
        })
    }
}

impl EmbeddingService for FastEmbedService {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| QuarryError::Capability(format!("Embedding failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| QuarryError::Capability("No embedding generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| QuarryError::Capability(format!("Batch embedding failed: {}", e)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl<E: EmbeddingService + ?Sized> EmbeddingService for std::sync::Arc<E> {
    fn embed(&self, text: &str) -> Result<Embedding> {
        (**self).embed(text)
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts)
    }
    fn dimension(&self) -> usize {
        (**self).dimension()
    }
    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Flattened text a document is embedded from
pub fn document_text(doc: &Document) -> String {
    let mut text = format!(
        "{}\nauthors: {}\n{}",
        doc.title(),
        doc.authors().join(", "),
        doc.abstract_text()
    );
    if !doc.tags().is_empty() {
        text.push_str("\ntags: ");
        text.push_str(&doc.tags().join(", "));
    }
    text
}

/// Scale a vector to unit length in place. Zero vectors are left as-is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provenance;

    #[test]
    fn test_document_text_format() {
        let doc = Document::new(
            "Attention Is All You Need",
            vec!["Vaswani".into(), "Shazeer".into()],
            "We propose the Transformer.",
            Provenance::new("arxiv", ""),
        )
        .unwrap()
        .with_tags(vec!["cs.CL".into()]);

        let text = document_text(&doc);
        assert!(text.starts_with("Attention Is All You Need\n"));
        assert!(text.contains("authors: Vaswani, Shazeer"));
        assert!(text.contains("We propose the Transformer."));
        assert!(text.ends_with("tags: cs.CL"));
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_unknown_model_name() {
        assert!(FastEmbedService::from_name("word2vec-classic").is_err());
    }

    #[test]
    #[ignore] // Requires downloading model
    fn test_fastembed_service() {
        let service = FastEmbedService::new().unwrap();
        assert_eq!(service.dimension(), 384);

        let embedding = service
            .embed("Sparse mixture-of-experts language models")
            .unwrap();
        assert_eq!(embedding.len(), 384);
    }

    #[test]
    #[ignore] // Requires downloading model
    fn test_batch_embedding() {
        let service = FastEmbedService::new().unwrap();

        let texts = vec![
            "Graph neural networks".to_string(),
            "Protein structure prediction".to_string(),
            "Reinforcement learning from human feedback".to_string(),
        ];

        let embeddings = service.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 3);
        assert_eq!(embeddings[0].len(), 384);
    }
}
