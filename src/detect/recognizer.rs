use crate::error::RecognitionError;

/// Caption model contract.
///
/// Implementations turn raw image bytes into free text. A call is a single
/// opaque request: no retries happen here, the next run pass is the retry.
pub trait Recognizer: Send + Sync {
    /// Recognizer identifier for logs.
    fn name(&self) -> &'static str;

    /// Describe the image. Must not retain the bytes beyond the call.
    fn describe(&self, image: &[u8]) -> Result<String, RecognitionError>;
}
