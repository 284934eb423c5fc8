use std::path::Path;

use tracing::warn;

use crate::chunker::{ChunkingConfig, FormFeedPages, PagedChunker, TextChunker};
use crate::config::ChunkingSettings;
use crate::traits::ChunkStrategy;

/// Ordered list of chunking strategies; the first one that accepts a file's
/// extension wins.
pub struct ChunkerRegistry {
    strategies: Vec<Box<dyn ChunkStrategy>>,
}

impl ChunkerRegistry {
    pub fn empty() -> Self {
        Self { strategies: Vec::new() }
    }

    /// Registry with the plain-text strategy.
    pub fn new(config: ChunkingConfig) -> Self {
        Self::empty().register(TextChunker::new(config))
    }

    /// Plain text plus form-feed paged text for `settings.paged_extensions`.
    pub fn from_settings(settings: &ChunkingSettings) -> Self {
        let config = ChunkingConfig::from(settings);
        let registry = Self::new(config.clone());
        if settings.paged_extensions.is_empty() {
            return registry;
        }
        registry.register(PagedChunker::new(
            config,
            FormFeedPages,
            settings.paged_extensions.iter().cloned(),
        ))
    }

    pub fn register<S: ChunkStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn for_file_name(&self, file_name: &str) -> Option<&dyn ChunkStrategy> {
        let extension = file_extension(file_name);
        let found = self
            .strategies
            .iter()
            .find(|s| s.can_handle(&extension))
            .map(|s| &**s);
        if found.is_none() {
            warn!(extension = %extension, "no chunking strategy for file extension");
        }
        found
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for ext in self.strategies.iter().flat_map(|s| s.extensions()) {
            if !out.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
                out.push(ext);
            }
        }
        out
    }
}

impl Default for ChunkerRegistry {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

/// Extension of `file_name` with its leading dot, or an empty string.
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}
