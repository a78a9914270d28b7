pub mod cdx;
pub mod client;
pub mod error;
pub mod gate;
pub mod snapshot;

pub use cdx::{CdxRecord, CdxRequest, CdxTime};
pub use client::ArchiveClient;
pub use error::{ArchiveError, Result};
pub use gate::ErrorGate;
pub use snapshot::{Snapshot, SnapshotId};
