//! Caption-based trigger detection.
//!
//! The detector hands snapshot bytes to a `Recognizer`, lower-cases the
//! returned caption and reports which trigger words occur in it. Recognizer
//! backends live under `backends`.

mod backends;
mod detector;
mod recognizer;
mod result;
mod triggers;

pub use backends::{CommandRecognizer, HttpRecognizer};
pub use detector::Detector;
pub use recognizer::Recognizer;
pub use result::DetectionResult;
pub use triggers::TriggerSet;
