use crate::downloader::{ExportError, to_csv};
use crate::pipeline::BatchOutcome;
use std::fs;
use std::path::{Path, PathBuf};

/// Write the CSV export of `outcome` to `path`
///
/// Missing parent directories are created. Returns the path written.
pub fn save_results(outcome: &BatchOutcome, path: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, to_csv(outcome)?)?;
    log::info!("Saved {} results to {}", outcome.records.len(), path.display());

    Ok(path.to_path_buf())
}
