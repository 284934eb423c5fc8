//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`APP_RAG__MIN_SCORE=0.5`).
//! [`Settings`] is the typed, validated view consumed by the other crates.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{DEFAULT_MAX_SOURCES, DEFAULT_MIN_SCORE};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Build a configuration from an inline TOML document layered over the
    /// defaults. Used by tests and embedders that carry their own config.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::string(toml));
        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Typed view of the whole configuration, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rag: RagSettings,
    pub chunking: ChunkingSettings,
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub ingest: IngestSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.rag.max_sources == 0 {
            return Err(Error::InvalidConfig("rag.max_sources must be positive".into()));
        }
        if !self.rag.min_score.is_finite() {
            return Err(Error::InvalidConfig("rag.min_score must be finite".into()));
        }
        if self.chunking.max_chars == 0 {
            return Err(Error::InvalidConfig("chunking.max_chars must be positive".into()));
        }
        if let Some(bad) = self.chunking.paged_extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(Error::InvalidConfig(format!(
                "chunking.paged_extensions entry '{bad}' must start with '.'"
            )));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        if self.store.dimension == Some(0) {
            return Err(Error::InvalidConfig("store.dimension must be positive".into()));
        }
        if self.store.kind == StoreKind::File && self.store.path.is_none() {
            return Err(Error::InvalidConfig("store.path is required for the file store".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub max_sources: usize,
    pub min_score: f32,
    pub no_results_message: String,
    pub error_message: String,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            max_sources: DEFAULT_MAX_SOURCES,
            min_score: DEFAULT_MIN_SCORE,
            no_results_message: "I couldn't find any relevant information to answer your question."
                .to_string(),
            error_message: "An error occurred while processing your request. Please try again."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Soft upper bound on fragment length, in characters.
    pub max_chars: usize,
    /// Extensions chunked page by page, pages separated by form feeds.
    pub paged_extensions: Vec<String>,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { max_chars: 1000, paged_extensions: vec![".pages".to_string()] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Snapshot file for the file store; `~` and `$VAR` are expanded.
    pub path: Option<String>,
    /// Fix the embedding dimension up front instead of taking it from the
    /// first insert.
    pub dimension: Option<usize>,
    /// Fail a search on a stored vector of the wrong length instead of
    /// scoring that record 0.
    pub strict_dimensions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub dim: usize,
    /// Most recent embeddings kept in memory; 0 disables the cache.
    pub cache_capacity: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { provider: "hash".to_string(), dim: 1536, cache_capacity: 0 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// On a failed embedding, discard the fragments embedded so far instead of
    /// storing them. The document's previous version is kept either way.
    pub rollback_on_failure: bool,
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
