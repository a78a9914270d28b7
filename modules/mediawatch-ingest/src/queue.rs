use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use crate::jobs::{DiscoverJob, FetchJob, ParseJob, StoreJob};

/// In-flight counter shared by every queue of a [`JobQueueSet`].
///
/// A job counts from `put` until its consumer signals `task_done`, so
/// `join` only completes once the whole cascade has drained.
#[derive(Default)]
struct PendingTracker {
    count: Mutex<usize>,
    drained: Notify,
}

impl PendingTracker {
    fn increment(&self) {
        *self.count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_waiters();
        }
    }

    async fn join(&self) {
        loop {
            // Register interest before reading the counter so a decrement
            // between the two cannot be missed.
            let drained = self.drained.notified();
            if *self.count.lock().unwrap_or_else(|e| e.into_inner()) == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// One unbounded FIFO queue for a single job type.
///
/// Several workers may consume it; the receiver lock is held only across
/// the dequeue itself, so jobs still execute in parallel.
pub struct JobQueue<T> {
    tx: UnboundedSender<T>,
    rx: tokio::sync::Mutex<UnboundedReceiver<T>>,
    pending: Arc<PendingTracker>,
}

impl<T> JobQueue<T> {
    fn new(pending: Arc<PendingTracker>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            pending,
        }
    }

    /// Enqueue without blocking.
    pub fn put(&self, job: T) {
        self.pending.increment();
        if self.tx.send(job).is_err() {
            // Receiver dropped during shutdown; the job is lost by design.
            self.pending.decrement();
        }
    }

    /// Dequeue one job. `None` means the queue was closed.
    pub async fn get(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Must be called exactly once per job obtained from `get`.
    pub fn task_done(&self) {
        self.pending.decrement();
    }
}

/// The four typed queues of the snapshot pipeline plus the shared
/// completion tracking across them.
pub struct JobQueueSet {
    pending: Arc<PendingTracker>,
    pub discover: Arc<JobQueue<DiscoverJob>>,
    pub fetch: Arc<JobQueue<FetchJob>>,
    pub parse: Arc<JobQueue<ParseJob>>,
    pub store: Arc<JobQueue<StoreJob>>,
}

impl JobQueueSet {
    pub fn new() -> Self {
        let pending = Arc::new(PendingTracker::default());
        Self {
            discover: Arc::new(JobQueue::new(Arc::clone(&pending))),
            fetch: Arc::new(JobQueue::new(Arc::clone(&pending))),
            parse: Arc::new(JobQueue::new(Arc::clone(&pending))),
            store: Arc::new(JobQueue::new(Arc::clone(&pending))),
            pending,
        }
    }

    /// Wait until every job put on any queue has been consumed and
    /// acknowledged, including successors enqueued along the way.
    pub async fn join(&self) {
        self.pending.join().await;
    }
}

impl Default for JobQueueSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::DiscoverJob;
    use chrono::{FixedOffset, TimeZone};
    use mediawatch_sites::site_collection;
    use std::time::Duration;

    fn discover_job(hour: u32) -> DiscoverJob {
        let site = site_collection().remove(0);
        let at = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 22, hour, 0, 0)
            .unwrap();
        DiscoverJob::new(site, at)
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let queues = JobQueueSet::new();
        queues.discover.put(discover_job(8));
        queues.discover.put(discover_job(12));
        queues.discover.put(discover_job(18));

        let hours: Vec<u32> = [
            queues.discover.get().await.unwrap(),
            queues.discover.get().await.unwrap(),
            queues.discover.get().await.unwrap(),
        ]
        .iter()
        .map(|j| {
            use chrono::Timelike;
            j.scheduled_at.hour()
        })
        .collect();

        assert_eq!(hours, vec![8, 12, 18]);
    }

    #[tokio::test]
    async fn join_returns_immediately_when_nothing_is_pending() {
        let queues = JobQueueSet::new();
        tokio::time::timeout(Duration::from_millis(50), queues.join())
            .await
            .expect("join on an idle set must not hang");
    }

    #[tokio::test]
    async fn join_waits_for_task_done_not_just_dequeue() {
        let queues = Arc::new(JobQueueSet::new());
        queues.discover.put(discover_job(8));

        let job = queues.discover.get().await.unwrap();
        drop(job);

        // Consumed but not acknowledged: join must still block.
        let pending_join =
            tokio::time::timeout(Duration::from_millis(50), queues.join()).await;
        assert!(pending_join.is_err(), "join completed before task_done");

        queues.discover.task_done();
        tokio::time::timeout(Duration::from_millis(50), queues.join())
            .await
            .expect("join must complete after task_done");
    }

    #[tokio::test]
    async fn join_tracks_jobs_across_queues() {
        let queues = Arc::new(JobQueueSet::new());
        queues.discover.put(discover_job(8));

        let worker_queues = Arc::clone(&queues);
        let worker = tokio::spawn(async move {
            let job = worker_queues.discover.get().await.unwrap();
            // Emit a successor before acknowledging, like a real worker.
            worker_queues.fetch.put(crate::jobs::FetchJob {
                id: job.id,
                site: job.site,
                scheduled_at: job.scheduled_at,
                snapshot_id: mediawatch_archive::SnapshotId {
                    timestamp: chrono::NaiveDate::from_ymd_opt(2024, 5, 22)
                        .unwrap()
                        .and_hms_opt(11, 48, 11)
                        .unwrap(),
                    original: "https://lemonde.fr".to_string(),
                },
            });
            worker_queues.discover.task_done();

            let fetched = worker_queues.fetch.get().await.unwrap();
            drop(fetched);
            worker_queues.fetch.task_done();
        });

        tokio::time::timeout(Duration::from_secs(1), queues.join())
            .await
            .expect("join must drain the cascade");
        worker.await.unwrap();
    }
}
