use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};
use uuid::Uuid;

use crate::queue::JobQueue;

/// One pipeline stage: consumes jobs of one type, may emit successors of
/// another.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type In: Send + 'static;
    type Out: Send + 'static;

    const NAME: &'static str;

    fn job_id(job: &Self::In) -> Uuid;

    async fn execute(&self, job: Self::In) -> anyhow::Result<Vec<Self::Out>>;
}

/// Generic worker loop.
///
/// Every job is acknowledged exactly once whatever happens; stage errors
/// are logged and swallowed so a bad capture never stalls the pipeline.
/// Successors with no outbound queue configured are an error in their
/// own right.
pub async fn run_worker<H: JobHandler>(
    handler: Arc<H>,
    inbound: Arc<JobQueue<H::In>>,
    outbound: Option<Arc<JobQueue<H::Out>>>,
) {
    loop {
        let Some(job) = inbound.get().await else {
            warn!(worker = H::NAME, "Inbound queue closed, exiting");
            return;
        };
        let job_id = H::job_id(&job);

        match handler.execute(job).await {
            Ok(successors) => match &outbound {
                Some(queue) => {
                    for successor in successors {
                        queue.put(successor);
                    }
                }
                None if !successors.is_empty() => {
                    error!(
                        worker = H::NAME,
                        job = %job_id,
                        dropped = successors.len(),
                        "Successor jobs produced but no outbound queue is configured"
                    );
                }
                None => {}
            },
            Err(e) => {
                error!(worker = H::NAME, job = %job_id, error = %e, "Job failed");
            }
        }

        inbound.task_done();
    }
}
