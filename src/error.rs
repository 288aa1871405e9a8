//! Failure kinds of the three external collaborators.
//!
//! Each kind is caught at the runner/notifier boundary and turned into a
//! recorded outcome. None of them is allowed to stop the process.

use std::fmt;

/// Camera unreachable or returned something that is not an image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("image fetch failed: {cause}")]
pub struct FetchError {
    pub cause: String,
}

impl FetchError {
    pub fn new(cause: impl fmt::Display) -> Self {
        Self {
            cause: cause.to_string(),
        }
    }
}

/// Caption model call failed or produced unusable output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("recognition failed: {cause}")]
pub struct RecognitionError {
    pub cause: String,
}

impl RecognitionError {
    pub fn new(cause: impl fmt::Display) -> Self {
        Self {
            cause: cause.to_string(),
        }
    }
}

/// Notification could not be delivered to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("delivery failed: {cause}")]
pub struct DeliveryError {
    pub cause: String,
}

impl DeliveryError {
    pub fn new(cause: impl fmt::Display) -> Self {
        Self {
            cause: cause.to_string(),
        }
    }
}

/// Stage at which a run pass failed before reaching notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

impl RunError {
    /// Short stage label used in reply and status text.
    pub fn stage(&self) -> &'static str {
        match self {
            RunError::Fetch(_) => "fetch",
            RunError::Recognition(_) => "recognition",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_reports_stage_and_cause() {
        let err: RunError = FetchError::new("connection refused").into();
        assert_eq!(err.stage(), "fetch");
        assert_eq!(err.to_string(), "image fetch failed: connection refused");

        let err: RunError = RecognitionError::new("empty caption").into();
        assert_eq!(err.stage(), "recognition");
        assert!(err.to_string().contains("empty caption"));
    }
}
