//! HTTP snapshot source.
//!
//! One GET per fetch; the whole response body is the image. MJPEG streams are
//! not supported, point the endpoint at the camera's still-capture URL.

use std::io::Read;
use std::time::Duration;

use super::{inspect_image, ImageSource};
use crate::error::FetchError;
use crate::frame::Snapshot;

const MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

pub struct HttpImageSource {
    url: String,
    agent: ureq::Agent,
}

impl HttpImageSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl ImageSource for HttpImageSource {
    fn location(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<Snapshot, FetchError> {
        log::info!("capturing image from {}", self.url);
        // ureq reports non-2xx statuses as errors.
        let response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| FetchError::new(format!("{}: {}", self.url, e)))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_IMAGE_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| FetchError::new(format!("read snapshot body: {}", e)))?;
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(FetchError::new(format!(
                "snapshot exceeds {} bytes",
                MAX_IMAGE_BYTES
            )));
        }

        let (format, width, height) = inspect_image(&bytes)?;
        let snapshot = Snapshot::new(bytes);
        log::info!(
            "image captured: {:?} {}x{} ({} bytes, {})",
            format,
            width,
            height,
            snapshot.len(),
            snapshot.digest_hex()
        );
        Ok(snapshot)
    }
}
