//! Local file snapshot source.
//!
//! Re-reads the file on every fetch, so replacing the file on disk changes
//! what the next run pass sees.

use std::path::PathBuf;

use super::{inspect_image, ImageSource};
use crate::error::FetchError;
use crate::frame::Snapshot;

pub struct FileImageSource {
    path: PathBuf,
}

impl FileImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSource for FileImageSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<Snapshot, FetchError> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| FetchError::new(format!("read {}: {}", self.path.display(), e)))?;
        let (format, width, height) = inspect_image(&bytes)?;
        let snapshot = Snapshot::new(bytes);
        log::info!(
            "image loaded from {}: {:?} {}x{} ({})",
            self.path.display(),
            format,
            width,
            height,
            snapshot.digest_hex()
        );
        Ok(snapshot)
    }
}
