//! Camera snapshot sources.
//!
//! This module provides the sources a run pass fetches its image from:
//! - HTTP(S) snapshot endpoints (IP cameras, ESP32-CAM `/capture`)
//! - Local image files (bench testing without a camera)
//!
//! Every source must be safe to call repeatedly and keeps no session state
//! between fetches. A response that is not a recognizable image is a
//! `FetchError`, never a caption input.

pub mod file;
pub mod http;

pub use file::FileImageSource;
pub use http::HttpImageSource;

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;
use crate::frame::Snapshot;

/// Image acquisition contract.
pub trait ImageSource: Send + Sync {
    /// Human-readable location for status and logs.
    fn location(&self) -> String;

    /// Capture one snapshot.
    fn fetch(&self) -> Result<Snapshot, FetchError>;
}

/// Builds the source matching the endpoint's URL scheme.
pub fn open_source(endpoint: &str, timeout: Duration) -> Result<Arc<dyn ImageSource>> {
    let url = Url::parse(endpoint).context("parse camera endpoint")?;
    match url.scheme() {
        "http" | "https" => Ok(Arc::new(HttpImageSource::new(endpoint, timeout))),
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| anyhow!("camera endpoint '{}' is not a local path", endpoint))?;
            Ok(Arc::new(FileImageSource::new(path)))
        }
        other => Err(anyhow!(
            "unsupported camera scheme '{}'; expected http(s) or file",
            other
        )),
    }
}

/// Verifies that `bytes` hold a decodable image header and reports its shape.
pub(crate) fn inspect_image(bytes: &[u8]) -> Result<(ImageFormat, u32, u32), FetchError> {
    if bytes.is_empty() {
        return Err(FetchError::new("empty image"));
    }
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| FetchError::new(format!("read image header: {}", e)))?;
    let format = reader
        .format()
        .ok_or_else(|| FetchError::new("response is not a recognizable image"))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| FetchError::new(format!("invalid {:?} image: {}", format, e)))?;
    Ok((format, width, height))
}
