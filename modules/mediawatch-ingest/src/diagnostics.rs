use std::path::{Path, PathBuf};

use tracing::error;

use mediawatch_archive::cdx::format_timestamp;
use mediawatch_archive::Snapshot;
use mediawatch_sites::ParseError;

/// Persist everything needed to debug a parse failure offline: the raw
/// HTML, the error, and the capture URL, in a directory keyed by the
/// capture identity.
pub fn persist_parse_failure(
    base_dir: &Path,
    snapshot: &Snapshot,
    error: &ParseError,
) -> std::io::Result<PathBuf> {
    let sub_dir = base_dir
        .join(urlencoding::encode(&snapshot.id.original).as_ref())
        .join(format_timestamp(&snapshot.id.timestamp));
    std::fs::create_dir_all(&sub_dir)?;

    std::fs::write(sub_dir.join("snapshot.html"), &snapshot.text)?;
    std::fs::write(sub_dir.join("exception.txt"), format!("{error}\n"))?;
    std::fs::write(sub_dir.join("url.txt"), snapshot.id.web_url())?;

    error!(
        url = %snapshot.id.web_url(),
        details_dir = %sub_dir.display(),
        "Parse failure details written"
    );
    Ok(sub_dir)
}
