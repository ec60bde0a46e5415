//! Configuration file handling for Crowdspace.
//!
//! Loads settings from `crowdspace.config.toml` with the following search order:
//! 1. Current directory
//! 2. ~/.config/crowdspace/crowdspace.config.toml (Linux/macOS)
//! 3. ~/.crowdspace/crowdspace.config.toml
//!
//! `GOOGLE_API_KEY`, `GEMMA_EMBEDDING_MODEL` and `PORT` override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use embed::GeminiOptions;
use search::SearchOptions;
use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CrowdspaceConfig {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: "127.0.0.1:3000".into() }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name passed to the provider.
    pub model: String,
    /// Provider base URL.
    pub base_url: String,
    /// API key. Usually supplied through `GOOGLE_API_KEY` instead.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Pause between calls during bulk re-embedding, in milliseconds.
    pub reembed_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: embed::DEFAULT_MODEL.into(),
            base_url: embed::DEFAULT_BASE_URL.into(),
            api_key: None,
            timeout_secs: 30,
            reembed_delay_ms: 200,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of results.
    pub max_results: usize,
    /// Minimum cosine score for a result to count as relevant.
    pub min_score: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: search::DEFAULT_MAX_RESULTS,
            min_score: search::DEFAULT_MIN_SCORE,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the database (default: data_local_dir/crowdspace).
    pub path: Option<PathBuf>,
}

impl CrowdspaceConfig {
    /// Config file name.
    pub const FILENAME: &'static str = "crowdspace.config.toml";

    /// Load configuration from file, searching standard locations, then apply
    /// environment overrides. Returns defaults if no file is found.
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_file() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Load configuration from a specific path (no environment overrides).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: CrowdspaceConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GOOGLE_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Some(model) = non_empty("GEMMA_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(port) = non_empty("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            let host = self
                .server
                .addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "127.0.0.1".to_string());
            self.server.addr = format!("{}:{}", host, port);
        }
        self
    }

    /// Find config file in standard locations.
    pub fn find_config_file() -> Option<PathBuf> {
        // 1. Current directory
        let current = PathBuf::from(Self::FILENAME);
        if current.exists() {
            return Some(current);
        }

        // 2. Config directory (~/.config/crowdspace/ on Linux)
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("crowdspace").join(Self::FILENAME);
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Home directory fallback
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".crowdspace").join(Self::FILENAME);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Get the default config file path for the current platform.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("crowdspace").join(Self::FILENAME))
    }

    /// Get the data directory path (uses storage.path or default).
    pub fn data_dir(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("crowdspace")
        })
    }

    pub fn gemini_options(&self) -> GeminiOptions {
        GeminiOptions {
            base_url: self.embedding.base_url.clone(),
            model: self.embedding.model.clone(),
            api_key: self.embedding.api_key.clone(),
            timeout: Duration::from_secs(self.embedding.timeout_secs.max(1)),
        }
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            max_results: self.search.max_results,
            min_score: self.search.min_score,
        }
    }

    pub fn reembed_delay(&self) -> Duration {
        Duration::from_millis(self.embedding.reembed_delay_ms)
    }

    /// Generate a default config file with comments.
    pub fn generate_default_config() -> String {
        r#"# Crowdspace Configuration
# Place this file at:
#   - ./crowdspace.config.toml (current directory)
#   - ~/.config/crowdspace/crowdspace.config.toml (Linux/macOS)
#   - ~/.crowdspace/crowdspace.config.toml

[server]
# Listen address (PORT overrides the port)
addr = "127.0.0.1:3000"

[embedding]
# Embedding model (GEMMA_EMBEDDING_MODEL overrides)
model = "text-embedding-004"

# Provider endpoint
base_url = "https://generativelanguage.googleapis.com"

# API key; prefer the GOOGLE_API_KEY environment variable
# api_key = "..."

# Request timeout (seconds)
timeout_secs = 30

# Pause between projects during `crowdspace reembed` (milliseconds)
reembed_delay_ms = 200

[search]
# Maximum number of results
max_results = 3

# Results scoring below this are dropped, unless none clear it
min_score = 0.15

[storage]
# Path for the database (default: ~/.local/share/crowdspace)
# path = "/custom/path/to/crowdspace_data"
"#
        .to_string()
    }
}
