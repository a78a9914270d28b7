use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info, warn};

use mediawatch_index::{IndexError, SharedIndex, SimilarityIndex};
use mediawatch_store::Storage;

/// Rebuilds the similarity index whenever new embeddings land.
///
/// Each rebuild is a fresh immutable instance: saved to disk for other
/// processes, swapped into the shared handle for this one.
pub struct IndexerWorker {
    storage: Arc<Storage>,
    shared: SharedIndex,
    index_path: PathBuf,
    mapping_path: PathBuf,
    new_embeddings: Arc<Notify>,
}

impl IndexerWorker {
    pub fn new(
        storage: Arc<Storage>,
        shared: SharedIndex,
        index_path: PathBuf,
        mapping_path: PathBuf,
        new_embeddings: Arc<Notify>,
    ) -> Self {
        Self {
            storage,
            shared,
            index_path,
            mapping_path,
            new_embeddings,
        }
    }

    pub async fn run(self) {
        loop {
            self.new_embeddings.notified().await;

            info!("Starting similarity index rebuild");
            if let Err(e) = self.rebuild().await {
                match e {
                    RebuildError::Index(IndexError::Empty) => {
                        warn!("No embeddings in storage yet, index rebuild skipped");
                    }
                    other => error!(error = %other, "Similarity index rebuild failed"),
                }
            }
        }
    }

    async fn rebuild(&self) -> Result<(), RebuildError> {
        let embeddings = self.storage.list_all_embeddings().await?;
        let index = SimilarityIndex::build(embeddings)?;
        index.save(&self.index_path, &self.mapping_path)?;
        info!(titles = index.len(), "Similarity index ready");
        self.shared.swap(index);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum RebuildError {
    #[error(transparent)]
    Store(#[from] mediawatch_store::StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
}
