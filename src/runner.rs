//! Single-flight run pass: fetch -> detect -> notify.
//!
//! Both the scheduler and the `detect` command go through
//! `DetectionRunner::run_once`. At most one pass runs at a time; a call that
//! finds a pass in progress returns a skipped summary immediately instead of
//! waiting or queuing.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::archive::ImageArchive;
use crate::detect::{DetectionResult, Detector};
use crate::error::RunError;
use crate::ingest::ImageSource;
use crate::notify::{DeliveryReport, Notifier};
use crate::subscriber::SubscriptionRegistry;

pub const SKIP_ALREADY_RUNNING: &str = "already running";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Outcome of one `run_once` call.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub trigger: RunTrigger,
    pub skipped: bool,
    pub reason: Option<&'static str>,
    pub caption: Option<String>,
    pub matched: Vec<String>,
    pub error: Option<RunError>,
    pub deliveries: DeliveryReport,
    pub finished_at: DateTime<Local>,
}

impl RunSummary {
    fn new(trigger: RunTrigger) -> Self {
        Self {
            trigger,
            skipped: false,
            reason: None,
            caption: None,
            matched: Vec::new(),
            error: None,
            deliveries: DeliveryReport::default(),
            finished_at: Local::now(),
        }
    }

    fn skipped(trigger: RunTrigger) -> Self {
        Self {
            skipped: true,
            reason: Some(SKIP_ALREADY_RUNNING),
            ..Self::new(trigger)
        }
    }

    fn failed(trigger: RunTrigger, error: RunError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(trigger)
        }
    }

    fn completed(trigger: RunTrigger, result: &DetectionResult, deliveries: DeliveryReport) -> Self {
        Self {
            caption: Some(result.caption.clone()),
            matched: result.matched.clone(),
            deliveries,
            ..Self::new(trigger)
        }
    }

    pub fn is_match(&self) -> bool {
        !self.matched.is_empty()
    }

    /// One-line outcome for logs and status text.
    pub fn outcome(&self) -> String {
        if self.skipped {
            return format!("skipped: {}", self.reason.unwrap_or(SKIP_ALREADY_RUNNING));
        }
        if let Some(err) = &self.error {
            return format!("{} failed: {}", err.stage(), err);
        }
        if !self.is_match() {
            return "no trigger words detected".to_string();
        }
        let mut line = format!(
            "matched {} (notified {}/{})",
            self.matched.join(", "),
            self.deliveries.delivered.len(),
            self.deliveries.attempted()
        );
        if !self.deliveries.all_delivered() {
            line.push_str(&format!(
                ", {} delivery failure(s)",
                self.deliveries.failed.len()
            ));
        }
        line
    }
}

/// Counters since process start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

pub struct DetectionRunner {
    source: Arc<dyn ImageSource>,
    detector: Detector,
    notifier: Notifier,
    registry: Arc<SubscriptionRegistry>,
    archive: Option<ImageArchive>,
    state: Mutex<RunState>,
    idle: Condvar,
    last_run: Mutex<Option<RunSummary>>,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Holds the Running state; dropping it (on any exit path, including
/// unwinding) returns the runner to Idle.
struct RunGuard<'a> {
    runner: &'a DetectionRunner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.runner.state() = RunState::Idle;
        self.runner.idle.notify_all();
    }
}

impl DetectionRunner {
    pub fn new(
        source: Arc<dyn ImageSource>,
        detector: Detector,
        notifier: Notifier,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            source,
            detector,
            notifier,
            registry,
            archive: None,
            state: Mutex::new(RunState::Idle),
            idle: Condvar::new(),
            last_run: Mutex::new(None),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn with_archive(mut self, archive: ImageArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn source_location(&self) -> String {
        self.source.location()
    }

    pub fn run_state(&self) -> RunState {
        *self.state()
    }

    /// Most recent pass that was not skipped.
    pub fn last_run(&self) -> Option<RunSummary> {
        self.last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }

    /// Runs one pass unless another is in flight.
    pub fn run_once(&self, trigger: RunTrigger) -> RunSummary {
        let Some(_guard) = self.try_begin() else {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            log::info!("{} detection skipped: {}", trigger.as_str(), SKIP_ALREADY_RUNNING);
            return RunSummary::skipped(trigger);
        };

        log::info!("starting {} detection cycle", trigger.as_str());
        let summary = self.execute(trigger);
        if summary.error.is_some() {
            self.failed.fetch_add(1, Ordering::SeqCst);
            log::warn!(
                "{} detection cycle: {}; retrying on the next cycle",
                trigger.as_str(),
                summary.outcome()
            );
        } else {
            self.completed.fetch_add(1, Ordering::SeqCst);
            log::info!(
                "{} detection cycle completed: {}",
                trigger.as_str(),
                summary.outcome()
            );
        }
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
        summary
    }

    /// Blocks until no pass is in flight.
    pub fn wait_idle(&self) {
        let mut state = self.state();
        while *state == RunState::Running {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        let mut state = self.state();
        if *state == RunState::Running {
            return None;
        }
        *state = RunState::Running;
        Some(RunGuard { runner: self })
    }

    fn execute(&self, trigger: RunTrigger) -> RunSummary {
        let snapshot = match self.source.fetch() {
            Ok(snapshot) => snapshot,
            Err(err) => return RunSummary::failed(trigger, err.into()),
        };
        let result = match self.detector.detect(&snapshot) {
            Ok(result) => result,
            Err(err) => return RunSummary::failed(trigger, err.into()),
        };

        if let Some(archive) = &self.archive {
            if result.is_match() || trigger == RunTrigger::Manual {
                archive.save(&result);
            }
        }

        if !result.is_match() {
            return RunSummary::completed(trigger, &result, DeliveryReport::default());
        }

        log::info!("trigger words detected: {}", result.matched.join(", "));
        let recipients = self.registry.active_subscribers();
        if recipients.is_empty() {
            log::warn!("match found but no active subscribers to notify");
        }
        let deliveries = self.notifier.notify(&result, &recipients);
        RunSummary::completed(trigger, &result, deliveries)
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
