use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use mediawatch_archive::{Snapshot, SnapshotId};
use mediawatch_sites::{FrontPage, SiteSpec};

/// Ask the archive which capture of a site is closest to an instant.
#[derive(Debug, Clone)]
pub struct DiscoverJob {
    /// Trace id, propagated to every descendant job.
    pub id: Uuid,
    pub site: SiteSpec,
    pub scheduled_at: DateTime<FixedOffset>,
}

impl DiscoverJob {
    pub fn new(site: SiteSpec, scheduled_at: DateTime<FixedOffset>) -> Self {
        Self {
            id: Uuid::new_v4(),
            site,
            scheduled_at,
        }
    }
}

/// Retrieve the capture body.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub id: Uuid,
    pub site: SiteSpec,
    pub scheduled_at: DateTime<FixedOffset>,
    pub snapshot_id: SnapshotId,
}

/// Extract the structured front page out of the raw HTML.
#[derive(Debug, Clone)]
pub struct ParseJob {
    pub id: Uuid,
    pub site: SiteSpec,
    pub scheduled_at: DateTime<FixedOffset>,
    pub snapshot: Snapshot,
}

/// Persist the extracted front page.
#[derive(Debug, Clone)]
pub struct StoreJob {
    pub id: Uuid,
    pub site: SiteSpec,
    pub scheduled_at: DateTime<FixedOffset>,
    pub page: FrontPage,
}

/// Terminal stages produce no successors.
#[derive(Debug, Clone)]
pub enum NoJob {}
