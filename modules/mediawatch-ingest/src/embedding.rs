use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use mediawatch_common::config::EmbeddingsConfig;
use mediawatch_index::{FastembedEmbedder, TextEmbedder};
use mediawatch_store::{Storage, TitleRow};

/// How long to wait before retrying a failed model load.
const LOAD_RETRY: Duration = Duration::from_secs(30);

/// Produces an embedder instance. Indirection keeps the expensive model
/// load lazy and lets tests plug in a deterministic fake.
pub type EmbedderFactory = Arc<dyn Fn() -> Result<Arc<dyn TextEmbedder>> + Send + Sync>;

pub fn fastembed_factory(config: &EmbeddingsConfig) -> EmbedderFactory {
    let model = config.model.clone();
    let dimension = config.dimension;
    Arc::new(move || {
        FastembedEmbedder::load(&model, dimension).map(|e| Arc::new(e) as Arc<dyn TextEmbedder>)
    })
}

/// Background loop that keeps every stored title embedded.
///
/// Each iteration drains the titles lacking a vector in batches and
/// signals the indexer after any progress. The model is loaded once, on
/// first use, off the scheduling thread.
pub struct EmbeddingWorker {
    storage: Arc<Storage>,
    factory: EmbedderFactory,
    batch_size: usize,
    poll_interval: Duration,
    new_embeddings: Arc<Notify>,
}

impl EmbeddingWorker {
    pub fn new(
        storage: Arc<Storage>,
        factory: EmbedderFactory,
        config: &EmbeddingsConfig,
        new_embeddings: Arc<Notify>,
    ) -> Self {
        Self {
            storage,
            factory,
            batch_size: config.batch_size.max(1),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            new_embeddings,
        }
    }

    pub async fn run(self) {
        let mut embedder: Option<Arc<dyn TextEmbedder>> = None;

        loop {
            if embedder.is_none() {
                let factory = Arc::clone(&self.factory);
                match tokio::task::spawn_blocking(move || factory()).await {
                    Ok(Ok(loaded)) => embedder = Some(loaded),
                    Ok(Err(e)) => {
                        error!(error = %e, "Could not load embedding model, retrying");
                        tokio::time::sleep(LOAD_RETRY).await;
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "Embedding model loader panicked, retrying");
                        tokio::time::sleep(LOAD_RETRY).await;
                        continue;
                    }
                }
                info!("Embedding model ready");
            }
            let Some(model) = embedder.as_ref() else {
                continue;
            };

            if let Err(e) = self.drain_missing(model).await {
                error!(error = %e, "Embedding iteration failed");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn drain_missing(&self, embedder: &Arc<dyn TextEmbedder>) -> Result<()> {
        let missing = self.storage.list_titles_without_embedding().await?;
        if missing.is_empty() {
            return Ok(());
        }
        debug!(titles = missing.len(), "Titles waiting for an embedding");

        for batch in missing.chunks(self.batch_size) {
            let assigned = embed_batch(embedder, batch).await?;
            let stored = assigned.len();
            for (title_id, vector) in assigned {
                self.storage.add_embedding(title_id, &vector).await?;
            }
            debug!(stored, "Stored embeddings");

            if stored > 0 {
                self.new_embeddings.notify_one();
            }
        }
        Ok(())
    }
}

/// Encode one batch, deduplicating identical texts so the model sees
/// each unique string once, then fan the vectors back out per title id.
pub async fn embed_batch(
    embedder: &Arc<dyn TextEmbedder>,
    batch: &[TitleRow],
) -> Result<Vec<(i64, Vec<f32>)>> {
    let (unique_texts, id_groups) = dedup_texts(batch);
    let vectors = embedder.embed_batch(unique_texts).await?;
    anyhow::ensure!(
        vectors.len() == id_groups.len(),
        "embedder returned {} vectors for {} unique texts",
        vectors.len(),
        id_groups.len()
    );

    let mut assigned = Vec::with_capacity(batch.len());
    for (ids, vector) in id_groups.into_iter().zip(vectors) {
        for id in ids {
            assigned.push((id, vector.clone()));
        }
    }
    Ok(assigned)
}

/// Unique texts in first-seen order, each paired with every title id
/// carrying that text.
fn dedup_texts(batch: &[TitleRow]) -> (Vec<String>, Vec<Vec<i64>>) {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<&str, Vec<i64>> = HashMap::new();

    for title in batch {
        match groups.get_mut(title.text.as_str()) {
            Some(ids) => ids.push(title.id),
            None => {
                order.push(title.text.clone());
                groups.insert(title.text.as_str(), vec![title.id]);
            }
        }
    }

    let id_groups = order
        .iter()
        .map(|text| groups.remove(text.as_str()).unwrap_or_default())
        .collect();
    (order, id_groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediawatch_index::FakeEmbedder;

    fn title(id: i64, text: &str) -> TitleRow {
        TitleRow {
            id,
            text: text.to_string(),
        }
    }

    #[test]
    fn identical_texts_are_encoded_once() {
        let batch = vec![
            title(1, "Grève à la SNCF"),
            title(2, "Canicule en juin"),
            title(3, "Grève à la SNCF"),
        ];

        let (unique, groups) = dedup_texts(&batch);
        assert_eq!(unique, vec!["Grève à la SNCF", "Canicule en juin"]);
        assert_eq!(groups, vec![vec![1, 3], vec![2]]);
    }

    #[tokio::test]
    async fn every_title_gets_its_vector_back() {
        let embedder: Arc<dyn TextEmbedder> = Arc::new(FakeEmbedder::new(16));
        let batch = vec![
            title(1, "Grève à la SNCF"),
            title(2, "Canicule en juin"),
            title(3, "Grève à la SNCF"),
        ];

        let assigned = embed_batch(&embedder, &batch).await.unwrap();
        assert_eq!(assigned.len(), 3);

        let by_id: HashMap<i64, Vec<f32>> = assigned.into_iter().collect();
        // Duplicated text, identical vector.
        assert_eq!(by_id[&1], by_id[&3]);
        assert_ne!(by_id[&1], by_id[&2]);
    }
}
