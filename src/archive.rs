//! Best-effort on-disk copies of detection snapshots.
//!
//! Saving is fire-and-forget: errors are logged and never change the outcome
//! of the run pass that produced the snapshot.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::detect::DetectionResult;

#[derive(Clone, Debug)]
pub struct ImageArchive {
    dir: PathBuf,
}

impl ImageArchive {
    /// Creates the archive directory if it does not exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create archive directory {}", dir.display()))?;
        log::info!("saving detection images to {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `<trigger>_<YYYYmmdd_HHMMSS>_<digest>.<ext>`; returns the path on
    /// success. Distinct images saved within the same second get distinct names.
    pub fn save(&self, result: &DetectionResult) -> Option<PathBuf> {
        let path = self.dir.join(file_name(result));
        match std::fs::write(&path, result.snapshot.bytes()) {
            Ok(()) => {
                log::info!("image saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::error!("failed to save image {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn file_name(result: &DetectionResult) -> String {
    let label: String = result
        .primary_trigger()
        .unwrap_or("unknown")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!(
        "{}_{}_{}.{}",
        label,
        result.timestamp.format("%Y%m%d_%H%M%S"),
        result.snapshot.digest_hex(),
        result.snapshot.extension()
    )
}
