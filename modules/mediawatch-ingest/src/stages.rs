use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use mediawatch_archive::{ArchiveClient, ArchiveError, Snapshot, SnapshotId};
use mediawatch_sites::FrontPage;
use mediawatch_store::Storage;

use crate::diagnostics;
use crate::jobs::{DiscoverJob, FetchJob, NoJob, ParseJob, StoreJob};
use crate::worker::JobHandler;

/// The archive operations the pipeline needs. A trait seam so the
/// stages can be driven against a fake in tests.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn find_closest(
        &self,
        url: &str,
        target: DateTime<Utc>,
    ) -> mediawatch_archive::Result<SnapshotId>;

    async fn fetch(&self, id: &SnapshotId) -> mediawatch_archive::Result<Snapshot>;
}

#[async_trait]
impl SnapshotSource for ArchiveClient {
    async fn find_closest(
        &self,
        url: &str,
        target: DateTime<Utc>,
    ) -> mediawatch_archive::Result<SnapshotId> {
        ArchiveClient::find_closest(self, url, target).await
    }

    async fn fetch(&self, id: &SnapshotId) -> mediawatch_archive::Result<Snapshot> {
        ArchiveClient::fetch(self, id).await
    }
}

/// Discover: locate the capture closest to the scheduled instant.
pub struct DiscoverStage {
    pub storage: Arc<Storage>,
    pub archive: Arc<dyn SnapshotSource>,
}

#[async_trait]
impl JobHandler for DiscoverStage {
    type In = DiscoverJob;
    type Out = FetchJob;

    const NAME: &'static str = "discover";

    fn job_id(job: &DiscoverJob) -> Uuid {
        job.id
    }

    async fn execute(&self, job: DiscoverJob) -> anyhow::Result<Vec<FetchJob>> {
        // Re-emission of already-captured pairs is routine (the watchdog
        // replays its whole window every hour); skip silently.
        if self
            .storage
            .front_page_exists(job.site.name, &job.scheduled_at)
            .await?
        {
            return Ok(Vec::new());
        }

        debug!(
            job = %job.id,
            site = job.site.name,
            scheduled_at = %job.scheduled_at,
            "Looking for capture"
        );

        let target = job.scheduled_at.with_timezone(&Utc);
        let snapshot_id = match self.archive.find_closest(job.site.url, target).await {
            Ok(id) => id,
            Err(ArchiveError::NotYetAvailable { .. }) => {
                warn!(
                    job = %job.id,
                    site = job.site.name,
                    scheduled_at = %job.scheduled_at,
                    "Capture not yet available"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let deviation = target - snapshot_id.timestamp.and_utc();
        if deviation.abs() > Duration::hours(1) {
            let side = if deviation > Duration::zero() {
                "before"
            } else {
                "after"
            };
            warn!(
                job = %job.id,
                site = job.site.name,
                capture = %snapshot_id.timestamp,
                deviation_secs = deviation.num_seconds().abs(),
                "Closest capture is {side} the requested instant by more than an hour"
            );
        }

        Ok(vec![FetchJob {
            id: job.id,
            site: job.site,
            scheduled_at: job.scheduled_at,
            snapshot_id,
        }])
    }
}

/// Fetch: retrieve the capture body.
pub struct FetchStage {
    pub archive: Arc<dyn SnapshotSource>,
}

#[async_trait]
impl JobHandler for FetchStage {
    type In = FetchJob;
    type Out = ParseJob;

    const NAME: &'static str = "fetch";

    fn job_id(job: &FetchJob) -> Uuid {
        job.id
    }

    async fn execute(&self, job: FetchJob) -> anyhow::Result<Vec<ParseJob>> {
        let snapshot = self.archive.fetch(&job.snapshot_id).await?;
        debug!(job = %job.id, capture = %snapshot.id, bytes = snapshot.text.len(), "Fetched capture");

        Ok(vec![ParseJob {
            id: job.id,
            site: job.site,
            scheduled_at: job.scheduled_at,
            snapshot,
        }])
    }
}

/// Parse: run the site's extractor over the HTML. Extraction is
/// CPU-bound on large pages, so it runs on the blocking pool.
pub struct ParseStage {
    pub diagnostics_dir: PathBuf,
}

#[async_trait]
impl JobHandler for ParseStage {
    type In = ParseJob;
    type Out = StoreJob;

    const NAME: &'static str = "parse";

    fn job_id(job: &ParseJob) -> Uuid {
        job.id
    }

    async fn execute(&self, job: ParseJob) -> anyhow::Result<Vec<StoreJob>> {
        let extractor = job.site.extractor;
        let snapshot = job.snapshot;
        let parsed = tokio::task::spawn_blocking(move || {
            match FrontPage::from_snapshot(extractor, &snapshot) {
                Ok(page) => Ok(page),
                Err(e) => Err((e, snapshot)),
            }
        })
        .await?;

        match parsed {
            Ok(page) => Ok(vec![StoreJob {
                id: job.id,
                site: job.site,
                scheduled_at: job.scheduled_at,
                page,
            }]),
            Err((error, snapshot)) => {
                if let Err(io_error) =
                    diagnostics::persist_parse_failure(&self.diagnostics_dir, &snapshot, &error)
                {
                    warn!(job = %job.id, error = %io_error, "Could not persist parse diagnostics");
                }
                Err(error.into())
            }
        }
    }
}

/// Store: write the page. Single worker; the storage serialises writes.
pub struct StoreStage {
    pub storage: Arc<Storage>,
}

#[async_trait]
impl JobHandler for StoreStage {
    type In = StoreJob;
    type Out = NoJob;

    const NAME: &'static str = "store";

    fn job_id(job: &StoreJob) -> Uuid {
        job.id
    }

    async fn execute(&self, job: StoreJob) -> anyhow::Result<Vec<NoJob>> {
        self.storage
            .add_page(&job.site, &job.page, &job.scheduled_at)
            .await?;
        info!(
            job = %job.id,
            site = job.site.name,
            scheduled_at = %job.scheduled_at,
            "Front page stored"
        );
        Ok(Vec::new())
    }
}
