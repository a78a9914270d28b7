use chrono::NaiveDateTime;

use crate::cdx::{format_timestamp, CdxRecord};

/// Identity of one archived capture: (archive timestamp, original URL).
/// Timestamps are UTC, as served by the archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId {
    pub timestamp: NaiveDateTime,
    pub original: String,
}

impl SnapshotId {
    pub fn from_record(record: &CdxRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            original: record.original.clone(),
        }
    }

    /// URL of the archived copy itself.
    pub fn web_url(&self) -> String {
        format!(
            "http://web.archive.org/web/{}/{}",
            format_timestamp(&self.timestamp),
            self.original
        )
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.original, self.timestamp)
    }
}

/// A retrieved capture: its identity plus the exact body text.
#[derive(Clone)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub text: String,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The body can be megabytes; keep it out of logs.
        f.debug_struct("Snapshot")
            .field("id", &self.id)
            .field("text_len", &self.text.len())
            .finish()
    }
}
