use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::info;

use mediawatch_archive::ArchiveClient;
use mediawatch_common::Config;
use mediawatch_index::SharedIndex;
use mediawatch_sites::site_collection;
use mediawatch_store::Storage;

use crate::embedding::{fastembed_factory, EmbeddingWorker};
use crate::indexer::IndexerWorker;
use crate::queue::JobQueueSet;
use crate::stages::{DiscoverStage, FetchStage, ParseStage, SnapshotSource, StoreStage};
use crate::watchdog::Watchdog;
use crate::worker::run_worker;

const DISCOVER_WORKERS: usize = 3;
const FETCH_WORKERS: usize = 3;
const PARSE_WORKERS: usize = 3;
// The storage serialises writes; a single store lane matches it.
const STORE_WORKERS: usize = 1;

/// Assemble and run the whole service until interrupted.
pub async fn run(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.internet_archive.state_dir)
        .context("creating archive state dir")?;
    std::fs::create_dir_all(&config.diagnostics_dir).context("creating diagnostics dir")?;

    let storage = Arc::new(
        Storage::open(config.sqlite_path()?)
            .await
            .context("opening storage")?,
    );
    let archive: Arc<dyn SnapshotSource> = Arc::new(ArchiveClient::new(
        &config.internet_archive,
        Duration::from_secs(config.http.timeout_secs),
    )?);

    let queues = Arc::new(JobQueueSet::new());
    let shared_index = SharedIndex::new();
    let new_embeddings = Arc::new(Notify::new());
    // Pre-arm the indexer so an index is built from whatever embeddings
    // already exist before the first batch lands.
    new_embeddings.notify_one();

    let mut workers = JoinSet::new();

    let discover = Arc::new(DiscoverStage {
        storage: Arc::clone(&storage),
        archive: Arc::clone(&archive),
    });
    for _ in 0..DISCOVER_WORKERS {
        workers.spawn(run_worker(
            Arc::clone(&discover),
            Arc::clone(&queues.discover),
            Some(Arc::clone(&queues.fetch)),
        ));
    }

    let fetch = Arc::new(FetchStage {
        archive: Arc::clone(&archive),
    });
    for _ in 0..FETCH_WORKERS {
        workers.spawn(run_worker(
            Arc::clone(&fetch),
            Arc::clone(&queues.fetch),
            Some(Arc::clone(&queues.parse)),
        ));
    }

    let parse = Arc::new(ParseStage {
        diagnostics_dir: config.diagnostics_dir.clone(),
    });
    for _ in 0..PARSE_WORKERS {
        workers.spawn(run_worker(
            Arc::clone(&parse),
            Arc::clone(&queues.parse),
            Some(Arc::clone(&queues.store)),
        ));
    }

    let store = Arc::new(StoreStage {
        storage: Arc::clone(&storage),
    });
    for _ in 0..STORE_WORKERS {
        workers.spawn(run_worker(
            Arc::clone(&store),
            Arc::clone(&queues.store),
            None,
        ));
    }

    let watchdog = Watchdog::new(
        Arc::clone(&queues),
        site_collection(),
        config.snapshots.days_in_past,
        config.snapshots.hours.clone(),
    );
    workers.spawn(watchdog.run());

    let embedding = EmbeddingWorker::new(
        Arc::clone(&storage),
        fastembed_factory(&config.embeddings),
        &config.embeddings,
        Arc::clone(&new_embeddings),
    );
    workers.spawn(embedding.run());

    let indexer = IndexerWorker::new(
        Arc::clone(&storage),
        shared_index,
        config.index.index_path.clone(),
        config.index.mapping_path.clone(),
        Arc::clone(&new_embeddings),
    );
    workers.spawn(indexer.run());

    info!("All workers running, waiting for shutdown signal");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down");
    workers.abort_all();
    while workers.join_next().await.is_some() {}
    storage.close().await;

    Ok(())
}
