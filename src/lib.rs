//! Watchword: camera trigger-word watcher
//!
//! Periodically fetches a still image from a camera, asks a recognizer for a
//! caption, and alerts subscribers when any configured trigger word appears
//! in it.
//!
//! # Architecture
//!
//! Two concurrent drivers share two guarded objects:
//!
//! - the `Scheduler` ticks at a fixed interval and calls
//!   `DetectionRunner::run_once`;
//! - command loops feed `CommandDispatcher` (`start`, `stop`, `status`,
//!   `detect`) from Telegram or the console.
//!
//! `DetectionRunner` owns the single-flight run state: a pass requested while
//! another is in flight is skipped, never queued. `SubscriptionRegistry` owns
//! the recipient map. Fetch and recognition failures end the pass and are
//! retried by the next cycle; per-recipient delivery failures never block
//! other recipients.
//!
//! # Module Structure
//!
//! - `detect`: trigger matching and recognizer backends
//! - `ingest`: image sources (HTTP camera, local file)
//! - `notify`: alert text and per-recipient fan-out
//! - `transport`: Telegram Bot API and console adapters
//! - `orchestrator`: lifecycle and graceful shutdown

pub mod archive;
pub mod command;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod orchestrator;
pub mod runner;
pub mod scheduler;
pub mod subscriber;
pub mod transport;

pub use archive::ImageArchive;
pub use command::{
    Command, CommandDispatcher, CommandSource, InboundCommand, ResponseSink,
};
pub use config::{RecognizerSettings, WatchwordConfig};
pub use detect::{
    CommandRecognizer, DetectionResult, Detector, HttpRecognizer, Recognizer, TriggerSet,
};
pub use error::{DeliveryError, FetchError, RecognitionError, RunError};
pub use frame::Snapshot;
pub use ingest::{open_source, ImageSource};
pub use notify::{DeliveryReport, NotificationChannel, Notifier};
pub use orchestrator::{CommandChannel, Orchestrator, OrchestratorOptions};
pub use runner::{DetectionRunner, RunState, RunStats, RunSummary, RunTrigger};
pub use scheduler::Scheduler;
pub use subscriber::{RecipientId, SubscriptionRegistry};
