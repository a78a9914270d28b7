use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::error::{ArchiveError, Result};

/// Persistent back-off gate for one error class.
///
/// The timestamp of the last observed error lives in a file so the quiet
/// period survives restarts. The decision is a pure function of
/// (last_error_at, relaxation, now); callers inject `now`.
#[derive(Debug, Clone)]
pub struct ErrorGate {
    name: &'static str,
    file_path: PathBuf,
    relaxation: Duration,
}

impl ErrorGate {
    pub fn new(name: &'static str, file_path: PathBuf, relaxation_secs: u64) -> Self {
        Self {
            name,
            file_path,
            relaxation: Duration::seconds(relaxation_secs as i64),
        }
    }

    /// Record an error occurrence. Best effort: losing the write only
    /// weakens the back-off, it must not mask the original error.
    pub fn notify(&self, now: DateTime<Utc>) {
        if let Err(e) = std::fs::write(&self.file_path, now.to_rfc3339()) {
            warn!(gate = self.name, error = %e, "Could not persist error gate timestamp");
        }
    }

    /// Fail fast while inside the relaxation window after the last error.
    pub fn check(&self, now: DateTime<Utc>) -> Result<()> {
        let Some(last_error_at) = self.last_error_at() else {
            return Ok(());
        };

        let relaxed_at = last_error_at + self.relaxation;
        if now < relaxed_at {
            return Err(ArchiveError::Backoff {
                gate: self.name,
                remaining_secs: (relaxed_at - now).num_seconds(),
            });
        }
        Ok(())
    }

    fn last_error_at(&self) -> Option<DateTime<Utc>> {
        let content = std::fs::read_to_string(&self.file_path).ok()?;
        match DateTime::parse_from_rfc3339(content.trim()) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!(gate = self.name, error = %e, "Ignoring unreadable error gate file");
                None
            }
        }
    }
}
