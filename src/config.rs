//! TOML settings plus environment-provided secrets.
//!
//! Every section of the settings file is optional and a missing file means
//! "all defaults", so the tool runs against the stock blog out of the box.
//! Secrets never live in the file: they are read from the environment into
//! the access structs at the bottom of this module, once, at startup, and
//! passed by reference to whatever needs them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RagError;

pub const DEFAULT_MODELS_ENDPOINT: &str = "https://models.inference.ai.azure.com";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub blog: BlogConfig,
    pub upload: UploadConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RepositoryConfig {
    pub url: String,
    pub path: PathBuf,
    pub content_subdir: String,
    pub refresh_after_hours: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: "https://github.com/rajbos/rajbos.github.io.git".to_string(),
            path: PathBuf::from("blog"),
            content_subdir: "_posts".to_string(),
            refresh_after_hours: 24,
        }
    }
}

impl RepositoryConfig {
    pub fn refresh_after(&self) -> Duration {
        Duration::from_secs(self.refresh_after_hours.saturating_mul(60 * 60))
    }

    pub fn content_dir(&self) -> PathBuf {
        if self.content_subdir.is_empty() || self.content_subdir == "." {
            self.path.clone()
        } else {
            self.path.join(&self.content_subdir)
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub persist_dir: PathBuf,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub rebuild_on_change: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("blog_index"),
            include_globs: vec![
                "**/*.md".to_string(),
                "**/*.markdown".to_string(),
                "**/*.txt".to_string(),
            ],
            exclude_globs: Vec::new(),
            rebuild_on_change: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 1024 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            batch_size: 64,
            max_retries: 0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub chat_model: String,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MODELS_ENDPOINT.to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub query_prefix: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 2,
            query_prefix: "Find the documents that answer the question: ".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BlogConfig {
    /// Public root of the blog, e.g. `https://devopsjournal.io/blog`.
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub container: String,
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            container: "blogposts".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub api_version: String,
    pub semantic_configuration: String,
    pub query_type: String,
    pub strictness: u8,
    pub top_n_documents: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_version: "2024-05-01-preview".to_string(),
            semantic_configuration: "default".to_string(),
            query_type: "simple".to_string(),
            strictness: 3,
            top_n_documents: 5,
            max_tokens: 800,
            temperature: 0.7,
            top_p: 0.95,
            timeout_secs: 120,
        }
    }
}

/// Read and validate the settings file. A file that does not exist yields
/// the defaults; a file that exists but does not parse is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }
    if config.repository.url.trim().is_empty() {
        anyhow::bail!("repository.url must not be empty");
    }
    Ok(())
}

// ============ Environment-provided access ============

/// Read a variable, treating an empty value as unset.
fn lookup_non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Credentials and endpoint for the OpenAI-compatible model API used for
/// embeddings, chat, and the rate-limit probe.
#[derive(Clone)]
pub struct ModelAccess {
    pub token: String,
    pub base_url: String,
}

impl std::fmt::Debug for ModelAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAccess")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ModelAccess {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `GITHUB_TOKEN` is required; `OPENAI_BASE_URL` overrides the configured endpoint.
    pub fn from_env(model: &ModelConfig) -> Result<Self, RagError> {
        Self::from_lookup(model, env_lookup)
    }

    pub fn from_lookup(
        model: &ModelConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RagError> {
        let token = lookup_non_empty(&lookup, "GITHUB_TOKEN")
            .ok_or(RagError::MissingSetting("GITHUB_TOKEN"))?;
        let base_url =
            lookup_non_empty(&lookup, "OPENAI_BASE_URL").unwrap_or_else(|| model.base_url.clone());
        Ok(Self::new(token, base_url))
    }
}

/// Settings for the search-grounded chat deployment.
#[derive(Clone)]
pub struct SearchChatAccess {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub search_endpoint: String,
    pub search_key: String,
    pub search_index: String,
}

impl std::fmt::Debug for SearchChatAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchChatAccess")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("deployment", &self.deployment)
            .field("search_endpoint", &self.search_endpoint)
            .field("search_key", &"<redacted>")
            .field("search_index", &self.search_index)
            .finish()
    }
}

impl SearchChatAccess {
    pub fn from_env() -> Result<Self, RagError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RagError> {
        let required = |key: &'static str| {
            lookup_non_empty(&lookup, key).ok_or(RagError::MissingSetting(key))
        };
        Ok(Self {
            endpoint: required("AZURE_OPENAI_ENDPOINT")?
                .trim_end_matches('/')
                .to_string(),
            api_key: required("AZURE_OPENAI_API_KEY")?,
            deployment: lookup_non_empty(&lookup, "AZURE_OPENAI_DEPLOYMENT")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            search_endpoint: required("AZURE_SEARCH_ENDPOINT")?,
            search_key: required("AZURE_SEARCH_KEY")?,
            search_index: required("AZURE_SEARCH_INDEX")?,
        })
    }
}

/// Connection string for the blob storage account.
pub fn storage_connection_string() -> Result<String, RagError> {
    lookup_non_empty(&env_lookup, "AZURE_STORAGE_CONNECTION_STRING")
        .ok_or(RagError::MissingSetting("AZURE_STORAGE_CONNECTION_STRING"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.retrieval.top_k, 2);
        assert_eq!(cfg.index.persist_dir, PathBuf::from("blog_index"));
        assert_eq!(cfg.repository.content_dir(), PathBuf::from("blog/_posts"));
        assert_eq!(cfg.repository.refresh_after(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cfg.toml");
        std::fs::write(
            &path,
            "[retrieval]\ntop_k = 5\n\n[blog]\nbase_url = \"https://example.com/blog\"\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.retrieval.top_k, 5);
        assert!(cfg.retrieval.query_prefix.starts_with("Find the documents"));
        assert_eq!(cfg.blog.base_url.as_deref(), Some("https://example.com/blog"));
        assert_eq!(cfg.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn test_huge_refresh_threshold_saturates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cfg.toml");
        std::fs::write(
            &path,
            "[repository]\nrefresh_after_hours = 9223372036854775807\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.repository.refresh_after(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cfg.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = 0\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_model_access_requires_token() {
        let err = ModelAccess::from_lookup(&ModelConfig::default(), lookup_from(&[])).unwrap_err();
        assert!(matches!(err, RagError::MissingSetting("GITHUB_TOKEN")));

        let err = ModelAccess::from_lookup(
            &ModelConfig::default(),
            lookup_from(&[("GITHUB_TOKEN", "  ")]),
        )
        .unwrap_err();
        assert!(matches!(err, RagError::MissingSetting("GITHUB_TOKEN")));
    }

    #[test]
    fn test_model_access_endpoint_override() {
        let access = ModelAccess::from_lookup(
            &ModelConfig::default(),
            lookup_from(&[("GITHUB_TOKEN", "t"), ("OPENAI_BASE_URL", "http://localhost:9/")]),
        )
        .unwrap();
        assert_eq!(access.base_url, "http://localhost:9");

        let access =
            ModelAccess::from_lookup(&ModelConfig::default(), lookup_from(&[("GITHUB_TOKEN", "t")]))
                .unwrap();
        assert_eq!(access.base_url, DEFAULT_MODELS_ENDPOINT);
        assert!(!format!("{:?}", access).contains("\"t\""));
    }

    #[test]
    fn test_search_access_names_missing_variable() {
        let err = SearchChatAccess::from_lookup(lookup_from(&[
            ("AZURE_OPENAI_ENDPOINT", "https://x.openai.azure.com/"),
            ("AZURE_OPENAI_API_KEY", "k"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RagError::MissingSetting("AZURE_SEARCH_ENDPOINT")));
    }
}
