//! End-to-end pipeline tests: discover → fetch → parse → store driven
//! through the real queues and worker loops, against a fake archive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use mediawatch_archive::{ArchiveError, Snapshot, SnapshotId};
use mediawatch_common::config::EmbeddingsConfig;
use mediawatch_index::{FakeEmbedder, SharedIndex, SimilarityIndex, TextEmbedder};
use mediawatch_ingest::embedding::EmbeddingWorker;
use mediawatch_ingest::indexer::IndexerWorker;
use mediawatch_ingest::jobs::DiscoverJob;
use mediawatch_ingest::queue::JobQueueSet;
use mediawatch_ingest::stages::{DiscoverStage, FetchStage, ParseStage, SnapshotSource, StoreStage};
use mediawatch_ingest::worker::run_worker;
use mediawatch_sites::{site_collection, SiteSpec};
use mediawatch_store::Storage;

const LE_MONDE_FIXTURE: &str = r#"
    <html><body>
      <div class="article--main">
        <a href="/web/20240522114811/https://www.lemonde.fr/a.html">
          <p class="article__title-label">La une du jour</p>
        </a>
      </div>
      <div class="top-article">
        <a href="/web/20240522114811/https://www.lemonde.fr/b.html">Article B</a>
      </div>
    </body></html>
"#;

struct FakeArchive {
    body: &'static str,
    available: bool,
    searches: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeArchive {
    fn new(body: &'static str) -> Self {
        Self {
            body,
            available: true,
            searches: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    fn unavailable() -> Self {
        Self {
            body: "",
            available: false,
            searches: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    fn capture_ts() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 22)
            .unwrap()
            .and_hms_opt(11, 48, 11)
            .unwrap()
    }
}

#[async_trait]
impl SnapshotSource for FakeArchive {
    async fn find_closest(
        &self,
        url: &str,
        target: DateTime<Utc>,
    ) -> mediawatch_archive::Result<SnapshotId> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(ArchiveError::NotYetAvailable { requested: target });
        }
        Ok(SnapshotId {
            timestamp: Self::capture_ts(),
            original: url.to_string(),
        })
    }

    async fn fetch(&self, id: &SnapshotId) -> mediawatch_archive::Result<Snapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Snapshot {
            id: id.clone(),
            text: self.body.to_string(),
        })
    }
}

fn le_monde() -> SiteSpec {
    site_collection()
        .into_iter()
        .find(|s| s.name == "le_monde")
        .unwrap()
}

fn noon_paris() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(2 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 5, 22, 12, 0, 0)
        .unwrap()
}

struct Pipeline {
    queues: Arc<JobQueueSet>,
    workers: Vec<JoinHandle<()>>,
}

fn spawn_pipeline(
    storage: Arc<Storage>,
    archive: Arc<dyn SnapshotSource>,
    diagnostics_dir: std::path::PathBuf,
) -> Pipeline {
    let queues = Arc::new(JobQueueSet::new());
    let mut workers = Vec::new();

    let discover = Arc::new(DiscoverStage {
        storage: Arc::clone(&storage),
        archive: Arc::clone(&archive),
    });
    workers.push(tokio::spawn(run_worker(
        discover,
        Arc::clone(&queues.discover),
        Some(Arc::clone(&queues.fetch)),
    )));

    let fetch = Arc::new(FetchStage { archive });
    workers.push(tokio::spawn(run_worker(
        fetch,
        Arc::clone(&queues.fetch),
        Some(Arc::clone(&queues.parse)),
    )));

    let parse = Arc::new(ParseStage { diagnostics_dir });
    workers.push(tokio::spawn(run_worker(
        parse,
        Arc::clone(&queues.parse),
        Some(Arc::clone(&queues.store)),
    )));

    let store = Arc::new(StoreStage { storage });
    workers.push(tokio::spawn(run_worker(
        store,
        Arc::clone(&queues.store),
        None,
    )));

    Pipeline { queues, workers }
}

impl Pipeline {
    async fn drive(self, job: DiscoverJob) {
        self.queues.discover.put(job);
        tokio::time::timeout(Duration::from_secs(5), self.queues.join())
            .await
            .expect("pipeline must drain");
        for worker in self.workers {
            worker.abort();
        }
    }
}

#[tokio::test]
async fn discover_to_store_chain_persists_the_front_page() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(
        Storage::open(dir.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap(),
    );
    let archive = Arc::new(FakeArchive::new(LE_MONDE_FIXTURE));

    let pipeline = spawn_pipeline(
        Arc::clone(&storage),
        Arc::clone(&archive) as Arc<dyn SnapshotSource>,
        dir.path().join("diagnostics"),
    );
    pipeline.drive(DiscoverJob::new(le_monde(), noon_paris())).await;

    assert!(storage
        .front_page_exists("le_monde", &noon_paris())
        .await
        .unwrap());

    let titles = storage.list_titles_without_embedding().await.unwrap();
    let texts: Vec<&str> = titles.iter().map(|t| t.text.as_str()).collect();
    assert!(texts.contains(&"La une du jour"));
    assert!(texts.contains(&"Article B"));

    assert_eq!(archive.searches.load(Ordering::SeqCst), 1);
    assert_eq!(archive.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replayed_discover_job_skips_without_archive_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(
        Storage::open(dir.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap(),
    );
    let archive = Arc::new(FakeArchive::new(LE_MONDE_FIXTURE));

    let pipeline = spawn_pipeline(
        Arc::clone(&storage),
        Arc::clone(&archive) as Arc<dyn SnapshotSource>,
        dir.path().join("diagnostics"),
    );
    pipeline.drive(DiscoverJob::new(le_monde(), noon_paris())).await;

    // Same (site, instant) again: the existence check short-circuits.
    let pipeline = spawn_pipeline(
        Arc::clone(&storage),
        Arc::clone(&archive) as Arc<dyn SnapshotSource>,
        dir.path().join("diagnostics"),
    );
    pipeline.drive(DiscoverJob::new(le_monde(), noon_paris())).await;

    assert_eq!(archive.searches.load(Ordering::SeqCst), 1);
    assert_eq!(archive.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unavailable_capture_drops_the_job_and_drains() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(
        Storage::open(dir.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap(),
    );
    let archive = Arc::new(FakeArchive::unavailable());

    let pipeline = spawn_pipeline(
        Arc::clone(&storage),
        Arc::clone(&archive) as Arc<dyn SnapshotSource>,
        dir.path().join("diagnostics"),
    );
    pipeline.drive(DiscoverJob::new(le_monde(), noon_paris())).await;

    assert!(!storage
        .front_page_exists("le_monde", &noon_paris())
        .await
        .unwrap());
    assert_eq!(archive.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn parse_failure_leaves_diagnostics_and_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(
        Storage::open(dir.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap(),
    );
    let archive = Arc::new(FakeArchive::new("<html><body>not a front page</body></html>"));
    let diagnostics_dir = dir.path().join("diagnostics");

    let pipeline = spawn_pipeline(
        Arc::clone(&storage),
        Arc::clone(&archive) as Arc<dyn SnapshotSource>,
        diagnostics_dir.clone(),
    );
    pipeline.drive(DiscoverJob::new(le_monde(), noon_paris())).await;

    assert!(!storage
        .front_page_exists("le_monde", &noon_paris())
        .await
        .unwrap());

    // One sub-directory per failed capture, holding the three artefacts.
    let failure_dir = diagnostics_dir
        .join(urlencoding::encode("https://lemonde.fr").as_ref())
        .join("20240522114811");
    assert!(failure_dir.join("snapshot.html").exists());
    assert!(failure_dir.join("exception.txt").exists());
    assert!(failure_dir.join("url.txt").exists());
}

#[tokio::test]
async fn embedding_worker_drains_titles_and_wakes_the_indexer() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(
        Storage::open(dir.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap(),
    );
    let archive = Arc::new(FakeArchive::new(LE_MONDE_FIXTURE));

    let pipeline = spawn_pipeline(
        Arc::clone(&storage),
        Arc::clone(&archive) as Arc<dyn SnapshotSource>,
        dir.path().join("diagnostics"),
    );
    pipeline.drive(DiscoverJob::new(le_monde(), noon_paris())).await;

    let notify = Arc::new(Notify::new());
    let config = EmbeddingsConfig {
        dimension: 16,
        batch_size: 64,
        poll_interval_secs: 1,
        ..EmbeddingsConfig::default()
    };
    let worker = EmbeddingWorker::new(
        Arc::clone(&storage),
        Arc::new(|| Ok(Arc::new(FakeEmbedder::new(16)) as Arc<dyn TextEmbedder>)),
        &config,
        Arc::clone(&notify),
    );
    let handle = tokio::spawn(worker.run());

    tokio::time::timeout(Duration::from_secs(5), notify.notified())
        .await
        .expect("worker must signal new embeddings");
    handle.abort();

    assert!(storage
        .list_titles_without_embedding()
        .await
        .unwrap()
        .is_empty());
    let stored = storage.list_all_embeddings().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|(_, v)| v.len() == 16));
}

#[tokio::test]
async fn indexer_rebuilds_and_saves_on_signal() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(
        Storage::open(dir.path().join("db.sqlite").to_str().unwrap())
            .await
            .unwrap(),
    );
    let archive = Arc::new(FakeArchive::new(LE_MONDE_FIXTURE));

    let pipeline = spawn_pipeline(
        Arc::clone(&storage),
        Arc::clone(&archive) as Arc<dyn SnapshotSource>,
        dir.path().join("diagnostics"),
    );
    pipeline.drive(DiscoverJob::new(le_monde(), noon_paris())).await;

    // Embed with the fake so the index has something to chew on.
    let embedder: Arc<dyn TextEmbedder> = Arc::new(FakeEmbedder::new(16));
    let titles = storage.list_titles_without_embedding().await.unwrap();
    for (id, vector) in mediawatch_ingest::embedding::embed_batch(&embedder, &titles)
        .await
        .unwrap()
    {
        storage.add_embedding(id, &vector).await.unwrap();
    }

    let index_path = dir.path().join("similarity.index");
    let mapping_path = dir.path().join("similarity.titles");
    let shared = SharedIndex::new();
    let notify = Arc::new(Notify::new());
    notify.notify_one();

    let indexer = IndexerWorker::new(
        Arc::clone(&storage),
        shared.clone(),
        index_path.clone(),
        mapping_path.clone(),
        Arc::clone(&notify),
    );
    let handle = tokio::spawn(indexer.run());

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while shared.current().is_none() {
        assert!(std::time::Instant::now() < deadline, "index never appeared");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();

    let current = shared.current().unwrap();
    assert_eq!(current.len(), 2);

    // The saved artefacts answer like the in-memory build.
    let loaded = SimilarityIndex::load(&index_path, &mapping_path).unwrap();
    let title_id = storage.list_all_embeddings().await.unwrap()[0].0;
    assert_eq!(
        loaded.search(&[title_id], 5, |_| true).unwrap(),
        current.search(&[title_id], 5, |_| true).unwrap()
    );
}
