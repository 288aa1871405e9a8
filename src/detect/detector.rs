use chrono::Local;
use std::sync::Arc;

use crate::detect::recognizer::Recognizer;
use crate::detect::result::DetectionResult;
use crate::detect::triggers::TriggerSet;
use crate::error::RecognitionError;
use crate::frame::Snapshot;

/// Captions a snapshot and matches the caption against the trigger set.
///
/// Stateless apart from the injected recognizer; one recognizer call per
/// `detect`.
#[derive(Clone)]
pub struct Detector {
    triggers: TriggerSet,
    recognizer: Arc<dyn Recognizer>,
}

impl Detector {
    pub fn new(triggers: TriggerSet, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            triggers,
            recognizer,
        }
    }

    pub fn triggers(&self) -> &TriggerSet {
        &self.triggers
    }

    pub fn detect(&self, snapshot: &Snapshot) -> Result<DetectionResult, RecognitionError> {
        log::debug!(
            "captioning snapshot {} ({} bytes) with {}",
            snapshot.digest_hex(),
            snapshot.len(),
            self.recognizer.name()
        );
        let caption = self.recognizer.describe(snapshot.bytes())?;
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(RecognitionError::new(format!(
                "{} returned an empty caption",
                self.recognizer.name()
            )));
        }
        log::info!("caption: {}", caption);

        let matched = self.triggers.matches_in(caption);
        Ok(DetectionResult {
            caption: caption.to_string(),
            matched,
            timestamp: Local::now(),
            snapshot: snapshot.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCaption {
        caption: &'static str,
        calls: AtomicUsize,
    }

    impl Recognizer for FixedCaption {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn describe(&self, _image: &[u8]) -> Result<String, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.caption.to_string())
        }
    }

    struct Broken;

    impl Recognizer for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn describe(&self, _image: &[u8]) -> Result<String, RecognitionError> {
            Err(RecognitionError::new("model timed out"))
        }
    }

    fn detector(recognizer: Arc<dyn Recognizer>) -> Detector {
        Detector::new(TriggerSet::new(["cat", "kitten"]).unwrap(), recognizer)
    }

    #[test]
    fn detect_calls_recognizer_once_and_matches() {
        let recognizer = Arc::new(FixedCaption {
            caption: "  A small Kitten sleeps ",
            calls: AtomicUsize::new(0),
        });
        let snapshot = Snapshot::new(b"jpeg".to_vec());

        let result = detector(recognizer.clone()).detect(&snapshot).unwrap();

        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.caption, "A small Kitten sleeps");
        assert_eq!(result.matched, vec!["kitten"]);
        assert!(result.is_match());
        assert_eq!(result.primary_trigger(), Some("kitten"));
        assert_eq!(result.snapshot.digest_hex(), snapshot.digest_hex());
    }

    #[test]
    fn empty_caption_is_a_recognition_error() {
        let recognizer = Arc::new(FixedCaption {
            caption: "   ",
            calls: AtomicUsize::new(0),
        });
        let err = detector(recognizer)
            .detect(&Snapshot::new(vec![0]))
            .unwrap_err();
        assert!(err.cause.contains("empty caption"));
    }

    #[test]
    fn recognizer_failures_propagate_unchanged() {
        let err = detector(Arc::new(Broken))
            .detect(&Snapshot::new(vec![0]))
            .unwrap_err();
        assert_eq!(err, RecognitionError::new("model timed out"));
    }
}
