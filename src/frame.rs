//! Captured camera snapshots.
//!
//! A `Snapshot` is the opaque image handle that flows from the image source
//! through detection, notification and the archive. Bytes are shared behind
//! an `Arc`, so handing a snapshot to several recipients never copies it.
//!
//! Snapshots MUST NOT be logged by content. Use `digest_hex()` and `len()`.

use chrono::{DateTime, Local};
use image::ImageFormat;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Hex characters of the SHA-256 digest shown in logs.
const DIGEST_PREFIX_LEN: usize = 12;

#[derive(Clone)]
pub struct Snapshot {
    bytes: Arc<[u8]>,
    captured_at: DateTime<Local>,
    digest: [u8; 32],
}

impl Snapshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        Self {
            bytes: bytes.into(),
            captured_at: Local::now(),
            digest,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Short content digest for log lines.
    pub fn digest_hex(&self) -> String {
        let mut hex = hex::encode(self.digest);
        hex.truncate(DIGEST_PREFIX_LEN);
        hex
    }

    /// Image format sniffed from the magic bytes, if recognizable.
    pub fn format(&self) -> Option<ImageFormat> {
        image::guess_format(&self.bytes).ok()
    }

    /// File extension matching the sniffed format.
    pub fn extension(&self) -> &'static str {
        self.format()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin")
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("len", &self.len())
            .field("digest", &self.digest_hex())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}
