use quarry_core::{
    ArxivConfig, ChatConfig, DuckDuckGoConfig, IndexConfig, PipelineConfig, RetrievalConfig,
    SynthesisConfig, ThreatScreenConfig,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Contents of `quarry.toml`. Every section and key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexSection,
    pub retrieval: RetrievalSection,
    pub web_search: WebSearchConfig,
    pub conversation: ConversationConfig,
    pub screen: ThreatScreenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8700)),
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    /// Prefer QUARRY_API_KEY / OPENAI_API_KEY over putting the key here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let chat = ChatConfig::default();
        Self {
            base_url: chat.base_url,
            model: chat.model,
            api_key: None,
            temperature: chat.temperature,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "bge-small-en-v1.5".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    pub similarity_threshold: f32,
    pub recall_k: usize,
    pub remember_results: bool,
    pub persist_on_write: bool,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            recall_k: 5,
            remember_results: true,
            persist_on_write: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub max_documents: usize,
    pub arxiv_max_results: usize,
    pub source_timeout_secs: u64,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            max_documents: 10,
            arxiv_max_results: 50,
            source_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub max_history: usize,
    /// 0 disables expiry.
    pub ttl_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            ttl_secs: 3600,
        }
    }
}

impl QuarryConfig {
    /// Parse a config file. Fails if the file is missing or malformed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Parse a config file, falling back to defaults when it is missing.
    /// A malformed file is logged and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Human-readable problems; empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let threshold = self.index.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            errors.push(format!(
                "index.similarity_threshold must be within [-1, 1], got {}",
                threshold
            ));
        }
        if self.index.recall_k == 0 {
            errors.push("index.recall_k must be greater than 0".to_string());
        }
        if self.retrieval.max_documents == 0 {
            errors.push("retrieval.max_documents must be greater than 0".to_string());
        }
        if self.retrieval.arxiv_max_results == 0 {
            errors.push("retrieval.arxiv_max_results must be greater than 0".to_string());
        }
        if self.web_search.enabled && self.web_search.max_results == 0 {
            errors.push("web_search.max_results must be greater than 0 when enabled".to_string());
        }
        if self.conversation.max_history == 0 {
            errors.push("conversation.max_history must be greater than 0".to_string());
        }
        if self.screen.max_input_chars == 0 {
            errors.push("screen.max_input_chars must be greater than 0".to_string());
        }
        if self.screen.fallback_query.chars().filter(|c| !c.is_whitespace()).count() < 3 {
            errors.push("screen.fallback_query needs at least 3 non-space characters".to_string());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            errors.push(format!(
                "generation.temperature must be within [0, 2], got {}",
                self.generation.temperature
            ));
        }

        for (key, secs) in [
            ("generation.timeout_secs", self.generation.timeout_secs),
            ("embedding.timeout_secs", self.embedding.timeout_secs),
            ("retrieval.source_timeout_secs", self.retrieval.source_timeout_secs),
        ] {
            if secs == 0 {
                errors.push(format!("{} must be greater than 0", key));
            }
        }

        errors
    }

    /// Config value, then QUARRY_API_KEY, then OPENAI_API_KEY.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.generation
            .api_key
            .clone()
            .or_else(|| std::env::var("QUARRY_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn index_dir(&self) -> PathBuf {
        self.server.data_dir.join("index")
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            base_url: self.generation.base_url.clone(),
            model: self.generation.model.clone(),
            temperature: self.generation.temperature,
            request_timeout: self.generation_timeout(),
        }
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig::new()
            .with_store_dir(self.index_dir())
            .with_embed_timeout(Duration::from_secs(self.embedding.timeout_secs))
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig::new()
            .with_max_documents(self.retrieval.max_documents)
            .with_recall_k(self.index.recall_k)
            .with_similarity_threshold(self.index.similarity_threshold)
            .with_web(self.web_search.enabled, self.web_search.max_results)
            .with_source_timeout(Duration::from_secs(self.retrieval.source_timeout_secs))
    }

    pub fn arxiv_config(&self) -> ArxivConfig {
        ArxivConfig {
            max_results: self.retrieval.arxiv_max_results,
            request_timeout: Duration::from_secs(self.retrieval.source_timeout_secs),
            ..ArxivConfig::default()
        }
    }

    pub fn duckduckgo_config(&self) -> DuckDuckGoConfig {
        DuckDuckGoConfig {
            request_timeout: Duration::from_secs(self.retrieval.source_timeout_secs),
            ..DuckDuckGoConfig::default()
        }
    }

    pub fn synthesis_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            timeout: self.generation_timeout(),
            ..SynthesisConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            remember_results: self.index.remember_results,
            persist_on_write: self.index.persist_on_write,
        }
    }

    pub fn conversation_ttl(&self) -> Option<Duration> {
        match self.conversation.ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: QuarryConfig = toml::from_str("").unwrap();
        assert_eq!(config.index.similarity_threshold, 0.7);
        assert_eq!(config.index.recall_k, 5);
        assert_eq!(config.retrieval.max_documents, 10);
        assert_eq!(config.retrieval.arxiv_max_results, 50);
        assert_eq!(config.conversation.max_history, 10);
        assert_eq!(config.screen.fallback_query, "artificial intelligence research");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config: QuarryConfig = toml::from_str(
            r#"
            [index]
            recall_k = 8

            [web_search]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.index.recall_k, 8);
        assert_eq!(config.index.similarity_threshold, 0.7);
        assert!(!config.web_search.enabled);
        assert!(!config.retrieval_config().web_enabled);
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let mut config = QuarryConfig::default();
        config.index.similarity_threshold = 1.5;
        config.retrieval.max_documents = 0;
        config.embedding.timeout_secs = 0;

        let errors = config.validate();
        assert_eq!(errors.len(), 3, "{:?}", errors);
        assert!(errors[0].contains("similarity_threshold"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = QuarryConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.server.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn test_show_round_trips() {
        let config = QuarryConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: QuarryConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.server.http_addr, config.server.http_addr);
        assert_eq!(back.conversation.ttl_secs, 3600);
    }

    #[test]
    fn test_config_key_wins() {
        let mut config = QuarryConfig::default();
        config.generation.api_key = Some("from-config".into());
        assert_eq!(config.resolved_api_key().as_deref(), Some("from-config"));
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let mut config = QuarryConfig::default();
        config.conversation.ttl_secs = 0;
        assert!(config.conversation_ttl().is_none());
    }
}
