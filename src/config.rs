//! TOML configuration parsing and validation.
//!
//! Docsight is configured from a single TOML file (default
//! `./config/docsight.toml`). Every section except `[db]`, `[documents]`, and
//! `[server]` has defaults.
//!
//! ```toml
//! [db]
//! path = "./data/docsight.sqlite"
//!
//! [documents]
//! dir = "./documents"
//! images_dir = "./extracted_images"
//!
//! [chunking]
//! chunk_size = 400
//!
//! [retrieval]
//! top_k = 5
//! privileged_roles = ["ADMIN", "CAPTAIN"]
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [llm]
//! provider = "ollama"
//! model = "mistral"
//! vision_model = "llava"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docsight_core::chunk::DEFAULT_CHUNK_SIZE;
use docsight_core::retrieval::{DEFAULT_ADMIN_ROLE, DEFAULT_HISTORY_TURNS, DEFAULT_TOP_K};
use docsight_core::session::{DEFAULT_MAX_USERS, DEFAULT_WINDOW};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Document store: `{ROLE}_{name}.pdf` files.
    pub dir: PathBuf,
    /// Where extracted page images are written and served from.
    pub images_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
    #[serde(default = "default_privileged_roles")]
    pub privileged_roles: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            history_turns: DEFAULT_HISTORY_TURNS,
            admin_role: default_admin_role(),
            privileged_roles: default_privileged_roles(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_history_turns() -> usize {
    DEFAULT_HISTORY_TURNS
}
fn default_admin_role() -> String {
    DEFAULT_ADMIN_ROLE.to_string()
}
fn default_privileged_roles() -> Vec<String> {
    vec!["ADMIN".to_string(), "CAPTAIN".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            url: default_llm_url(),
            model: default_llm_model(),
            vision_model: default_vision_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "mistral".to_string()
}
fn default_vision_model() -> String {
    "llava".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_max_users")]
    pub max_users: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_users: DEFAULT_MAX_USERS,
        }
    }
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}
fn default_max_users() -> usize {
    DEFAULT_MAX_USERS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Read and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Role names compare upper-cased everywhere.
    config.retrieval.admin_role = config.retrieval.admin_role.trim().to_uppercase();
    for role in config.retrieval.privileged_roles.iter_mut() {
        *role = role.trim().to_uppercase();
    }

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.retrieval.admin_role.trim().is_empty() {
        anyhow::bail!("retrieval.admin_role must not be empty");
    }

    if config.session.window == 0 || config.session.max_users == 0 {
        anyhow::bail!("session.window and session.max_users must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }

    Ok(config)
}
