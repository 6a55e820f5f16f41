use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{CounselError, SecretValue, require_env};

const DEFAULT_CONFIG_PATH: &str = "counsel.toml";
const CONFIG_PATH_ENV: &str = "COUNSEL_CONFIG";

/// Top-level configuration structure. Every section is optional in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub segmenter: SegmenterConfig,
    pub retrieval: RetrievalConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a configuration document without touching the filesystem.
    pub fn from_toml_str(raw: &str) -> Result<Self, CounselError> {
        toml::from_str(raw).map_err(|err| CounselError::InvalidConfiguration(err.to_string()))
    }

    /// Resolve the generative model secret (from environment only).
    pub fn llm_api_key(&self) -> Result<SecretValue, CounselError> {
        require_env(&self.llm.api_key_env)
    }

    pub fn search_api_key(&self) -> Result<SecretValue, CounselError> {
        require_env(&self.search.api_key_env)
    }

    pub fn embedding_api_key(&self) -> Result<SecretValue, CounselError> {
        require_env(&self.embedding.api_key_env)
    }
}

/// Helper to load configuration with guard rails around secrets.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `COUNSEL_CONFIG` environment variable.
    /// 3. `counsel.toml` in the current working directory.
    pub fn load(path: Option<PathBuf>) -> Result<Config, CounselError> {
        let candidate = resolve_path(path);
        let raw = fs::read_to_string(&candidate)
            .map_err(|err| CounselError::config_io(candidate.clone(), err))?;
        let config = Config::from_toml_str(&raw)?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Structural checks plus presence of every secret a live provider needs.
    pub fn validate(config: &Config) -> Result<(), CounselError> {
        let segmenter = &config.segmenter;
        if segmenter.min_chunk_size >= segmenter.max_chunk_size {
            return Err(CounselError::InvalidConfiguration(format!(
                "segmenter.min_chunk_size ({}) must be below segmenter.max_chunk_size ({})",
                segmenter.min_chunk_size, segmenter.max_chunk_size
            )));
        }
        if config.retrieval.neighbors == 0 {
            return Err(CounselError::InvalidConfiguration(
                "retrieval.neighbors must be at least 1".into(),
            ));
        }

        match config.llm.provider {
            ModelProvider::Gemini => {
                config.llm_api_key()?;
            }
            ModelProvider::Stub => {}
        }
        match config.search.provider {
            SearchProvider::Tavily => {
                config.search_api_key()?;
            }
            SearchProvider::Stub => {}
        }
        match config.embedding.provider {
            EmbeddingProvider::Gemini => {
                config.embedding_api_key()?;
            }
            EmbeddingProvider::Fastembed => {
                if !cfg!(feature = "qdrant-index") {
                    return Err(CounselError::InvalidConfiguration(
                        "embedding.provider = \"fastembed\" requires the qdrant-index feature"
                            .into(),
                    ));
                }
            }
            EmbeddingProvider::Stub => {}
        }
        if config.index.backend == IndexBackend::Qdrant && !cfg!(feature = "qdrant-index") {
            return Err(CounselError::InvalidConfiguration(
                "index.backend = \"qdrant\" requires the qdrant-index feature".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = path {
        return path;
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return PathBuf::from(from_env);
        }
    }

    Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Gemini,
    Stub,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ModelProvider,
    /// Fast, cheap tier: query extraction, verification, presentation, chat.
    pub fast_model: String,
    /// Higher quality tier: drafting and refining the analysis.
    pub pro_model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Stub,
            fast_model: "gemini-1.5-flash-002".into(),
            pro_model: "gemini-1.5-pro-002".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    Tavily,
    Stub,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProvider,
    pub api_key_env: String,
    pub max_results: usize,
    pub depth: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::Stub,
            api_key_env: "TAVILY_API_KEY".into(),
            max_results: 5,
            depth: "basic".into(),
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Gemini,
    Fastembed,
    Stub,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub api_key_env: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Stub,
            model: "text-embedding-004".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            dimensions: 768,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub url: String,
    pub collection: String,
    pub concurrency_limit: usize,
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Memory,
            url: "http://localhost:6334".into(),
            collection: "counsel_chunks".into(),
            concurrency_limit: 8,
            timeout_secs: 30,
        }
    }
}

impl IndexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub max_chunk_size: usize,
    pub min_chunk_size: usize,
    /// Interpreted as `overlap_size / 10` trailing words.
    pub overlap_size: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1500,
            min_chunk_size: 100,
            overlap_size: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub neighbors: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { neighbors: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}
