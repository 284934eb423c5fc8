#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::error::{Error, Result};
use docqa_core::traits::{EmbeddingGateway, GenerationGateway};

/// Returns a canned vector per exact text; anything else is a gateway error.
pub struct ScriptedEmbedder {
    pub dim: usize,
    pub vectors: HashMap<String, Vec<f32>>,
}

impl ScriptedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, vectors: HashMap::new() }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingGateway for ScriptedEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| Error::Gateway(format!("no vector scripted for '{text}'")))
    }
}

/// Wraps the hashing embedder and starts failing after `ok_calls` calls.
pub struct FlakyEmbedder {
    pub inner: docqa_embed::HashEmbedder,
    pub ok_calls: usize,
    pub calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(dim: usize, ok_calls: usize) -> Self {
        Self { inner: docqa_embed::HashEmbedder::new(dim), ok_calls, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingGateway for FlakyEmbedder {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
            return Err(Error::Gateway("embedding service unavailable".to_string()));
        }
        self.inner.embed(text).await
    }
}

/// Declares one dimension and returns another.
pub struct LyingEmbedder;

#[async_trait]
impl EmbeddingGateway for LyingEmbedder {
    fn dim(&self) -> usize {
        4
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

/// Records every prompt and answers with a fixed text.
pub struct RecordingGenerator {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new(reply: &str) -> Self {
        Self { reply: reply.to_string(), prompts: Mutex::new(Vec::new()) }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationGateway for RecordingGenerator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Fails every completion after a short delay.
pub struct FailingGenerator {
    pub message: String,
}

#[async_trait]
impl GenerationGateway for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Err(Error::Gateway(self.message.clone()))
    }
}

/// Never answers within a test's lifetime.
pub struct StalledGenerator;

#[async_trait]
impl GenerationGateway for StalledGenerator {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }
}
