pub mod bootstrap;
pub mod diagnostics;
pub mod embedding;
pub mod indexer;
pub mod jobs;
pub mod queue;
pub mod stages;
pub mod watchdog;
pub mod worker;

pub use bootstrap::run;
pub use jobs::{DiscoverJob, FetchJob, ParseJob, StoreJob};
pub use queue::{JobQueue, JobQueueSet};
pub use stages::SnapshotSource;
