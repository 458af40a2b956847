use crate::config::QuarryConfig;
use anyhow::Context;
use quarry_core::{
    ArxivSource, ConversationCache, DuckDuckGoSource, EmbeddingService, FastEmbedService,
    LoadOutcome, MultiSourceRetriever, OpenAiChat, PaperSource, Pipeline, QueryTransformer,
    SimilarityIndex, Synthesizer, TextGenerator, ThreatScreen, WebSource,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a pipeline run needs, wired together once per process.
#[derive(Clone)]
pub struct Components {
    pub pipeline: Arc<Pipeline>,
    pub index: Arc<SimilarityIndex>,
    pub conversations: Arc<ConversationCache>,
}

/// External capabilities, injectable so tests can substitute fakes.
pub struct Capabilities {
    pub embedder: Arc<dyn EmbeddingService>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub papers: Arc<dyn PaperSource>,
    pub web: Option<Arc<dyn WebSource>>,
}

impl Capabilities {
    /// Production capabilities: local embedding model, arXiv, DuckDuckGo,
    /// and an OpenAI-compatible generator when an API key is available.
    pub fn from_config(config: &QuarryConfig) -> anyhow::Result<Self> {
        info!("Loading embedding model {}...", config.embedding.model);
        let embedder = FastEmbedService::from_name(&config.embedding.model)
            .context("failed to load embedding model")?;

        let generator: Option<Arc<dyn TextGenerator>> = match config.resolved_api_key() {
            Some(key) => {
                let chat = OpenAiChat::new(key, config.chat_config())?;
                info!("Text generation: {}", chat.model_name());
                Some(Arc::new(chat))
            }
            None => {
                warn!("No API key configured; queries pass through unchanged and summaries are unavailable");
                None
            }
        };

        let web: Option<Arc<dyn WebSource>> = if config.web_search.enabled {
            Some(Arc::new(DuckDuckGoSource::new(config.duckduckgo_config())?))
        } else {
            None
        };

        Ok(Self {
            embedder: Arc::new(embedder),
            generator,
            papers: Arc::new(ArxivSource::new(config.arxiv_config())?),
            web,
        })
    }

    /// Only the embedding model; enough for index maintenance commands.
    pub fn embedder_from_config(config: &QuarryConfig) -> anyhow::Result<Arc<dyn EmbeddingService>> {
        let embedder = FastEmbedService::from_name(&config.embedding.model)
            .context("failed to load embedding model")?;
        Ok(Arc::new(embedder))
    }
}

/// Open the similarity index under the configured data directory. A missing
/// or corrupt store yields an empty index.
pub fn open_index(
    config: &QuarryConfig,
    embedder: Arc<dyn EmbeddingService>,
) -> anyhow::Result<Arc<SimilarityIndex>> {
    let index_config = config.index_config();
    index_config.validate()?;

    let index = SimilarityIndex::new(embedder, index_config);
    match index.reload()? {
        LoadOutcome::Loaded(n) => info!("Similarity index loaded: {} documents", n),
        LoadOutcome::Missing => info!("No similarity index at {:?}; starting empty", config.index_dir()),
        LoadOutcome::Corrupt(reason) => {
            warn!("Similarity index is corrupt ({}); starting empty", reason)
        }
    }
    Ok(Arc::new(index))
}

pub fn build(config: &QuarryConfig, caps: Capabilities) -> anyhow::Result<Components> {
    let problems = config.validate();
    if !problems.is_empty() {
        anyhow::bail!("invalid configuration: {}", problems.join("; "));
    }

    let index = open_index(config, caps.embedder)?;
    let screen = ThreatScreen::with_config(config.screen.clone())?;

    let transformer = match &caps.generator {
        Some(generator) => QueryTransformer::new(Arc::clone(generator), config.generation_timeout()),
        None => QueryTransformer::passthrough(),
    };
    let synthesizer = match caps.generator {
        Some(generator) => Synthesizer::new(generator, config.synthesis_config()),
        None => Synthesizer::without_generator(config.synthesis_config()),
    };

    let mut retriever = MultiSourceRetriever::new(caps.papers, config.retrieval_config())
        .with_index(Arc::clone(&index));
    if let Some(web) = caps.web {
        retriever = retriever.with_web(web);
    }

    let pipeline = Pipeline::new(screen, transformer, retriever, synthesizer)
        .with_memory(Arc::clone(&index), config.pipeline_config());

    let conversations = ConversationCache::new(
        config.conversation.max_history,
        config.conversation_ttl(),
    );

    Ok(Components {
        pipeline: Arc::new(pipeline),
        index,
        conversations: Arc::new(conversations),
    })
}
