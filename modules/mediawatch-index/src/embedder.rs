use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

/// Seam between the pipeline and the embedding model.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

/// Local ONNX embedding model.
///
/// Loading is expensive (model download + session init), so `load` is
/// blocking and meant to run once via `spawn_blocking`; encoding also
/// runs on the blocking pool so the scheduler stays responsive.
pub struct FastembedEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl FastembedEmbedder {
    /// Blocking. Resolves `name` to a model, downloads it if needed and
    /// initialises the session.
    pub fn load(name: &str, dimension: usize) -> Result<Self> {
        info!(model = name, "Loading embedding model");
        let model = TextEmbedding::try_new(
            InitOptions::new(resolve_model(name)?).with_show_download_progress(false),
        )
        .map_err(|e| anyhow::anyhow!("could not load embedding model '{name}': {e}"))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "multilingual-e5-large" => Ok(EmbeddingModel::MultilingualE5Large),
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        other => anyhow::bail!("unknown embedding model '{other}'"),
    }
}

#[async_trait]
impl TextEmbedder for FastembedEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
            model
                .embed(texts, None)
                .map_err(|e| anyhow::anyhow!("embedding failed: {e}"))
        })
        .await??;

        for vector in &vectors {
            anyhow::ensure!(
                vector.len() == self.dimension,
                "model produced a {}-dim vector, expected {}",
                vector.len(),
                self.dimension
            );
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedder for tests: the vector depends only on the text.
pub struct FakeEmbedder {
    pub dimension: usize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        (0..self.dimension)
            .map(|_| {
                // xorshift keeps every component dependent on the text.
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state % 1000) as f32 / 1000.0 - 0.5
            })
            .collect()
    }
}

#[async_trait]
impl TextEmbedder for FakeEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_embedder_is_deterministic_per_text() {
        let embedder = FakeEmbedder::new(8);
        let a = embedder
            .embed_batch(vec!["Une".to_string(), "Autre".to_string()])
            .await
            .unwrap();
        let b = embedder
            .embed_batch(vec!["Une".to_string(), "Autre".to_string()])
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a[0], a[1]);
        assert!(a.iter().all(|v| v.len() == 8));
    }
}
