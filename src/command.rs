//! Interactive command channel.
//!
//! Commands arrive as `(caller, text)` pairs from a `CommandSource` and are
//! answered through a `ResponseSink`. `CommandDispatcher` maps each command to
//! registry or runner calls and renders the reply text.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::notify::format_timestamp;
use crate::runner::{DetectionRunner, RunState, RunSummary, RunTrigger};
use crate::subscriber::{RecipientId, SubscriptionRegistry};

/// One inbound command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundCommand {
    pub caller: RecipientId,
    pub text: String,
}

impl InboundCommand {
    pub fn new(caller: impl Into<RecipientId>, text: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            text: text.into(),
        }
    }
}

/// Unbounded, non-restartable stream of inbound commands.
pub trait CommandSource: Send {
    fn name(&self) -> &'static str;

    /// Waits up to `wait` for commands. An empty batch is not end-of-stream;
    /// the stream only ends when the caller stops polling.
    fn poll(&mut self, wait: Duration) -> Result<Vec<InboundCommand>>;
}

/// Reply transport. Failures are logged by the caller, never propagated.
pub trait ResponseSink: Send + Sync {
    fn reply(&self, caller: &RecipientId, text: &str) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Detect,
    Help,
    Unknown(String),
}

impl Command {
    /// Parses `start`, `/start` and `/start@SomeBot` alike.
    pub fn parse(text: &str) -> Self {
        let word = text.split_whitespace().next().unwrap_or("");
        let word = word.strip_prefix('/').unwrap_or(word);
        let word = word.split('@').next().unwrap_or(word);
        match word.to_lowercase().as_str() {
            "start" | "subscribe" => Command::Start,
            "stop" | "unsubscribe" => Command::Stop,
            "status" => Command::Status,
            "detect" | "d" => Command::Detect,
            "help" => Command::Help,
            _ => Command::Unknown(text.trim().to_string()),
        }
    }
}

pub fn help_text() -> String {
    [
        "Camera trigger-word watcher.",
        "",
        "Commands:",
        "/start - receive alerts when a trigger word is seen",
        "/stop - stop receiving alerts",
        "/status - show watcher status",
        "/detect - run a detection now",
        "/help - show this message",
    ]
    .join("\n")
}

pub struct CommandDispatcher {
    registry: Arc<SubscriptionRegistry>,
    runner: Arc<DetectionRunner>,
    interval: Duration,
}

impl CommandDispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        runner: Arc<DetectionRunner>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            runner,
            interval,
        }
    }

    /// Executes a command for `caller` and returns the reply text.
    ///
    /// `Detect` runs a full pass and blocks for its duration; callers that
    /// must stay responsive run it off their loop thread.
    pub fn dispatch(&self, caller: &RecipientId, command: &Command) -> String {
        self.registry.touch(caller);
        match command {
            Command::Start => self.start(caller),
            Command::Stop => self.stop(caller),
            Command::Status => self.status(caller),
            Command::Detect => {
                log::info!("manual detection triggered by {}", caller);
                let summary = self.runner.run_once(RunTrigger::Manual);
                self.detect_reply(&summary)
            }
            Command::Help => help_text(),
            Command::Unknown(text) => {
                log::debug!("unrecognized command from {}: {}", caller, text);
                format!("Unknown command.\n\n{}", help_text())
            }
        }
    }

    fn start(&self, caller: &RecipientId) -> String {
        let triggers = self.trigger_list();
        if self.registry.subscribe(caller) {
            log::info!("{} subscribed", caller);
            format!(
                "You've been added to the notification list.\nYou'll receive alerts when {} is detected.",
                triggers
            )
        } else {
            "You're already on the notification list.".to_string()
        }
    }

    fn stop(&self, caller: &RecipientId) -> String {
        if self.registry.unsubscribe(caller) {
            log::info!("{} unsubscribed", caller);
            "You've been removed from the notification list. Send /start to subscribe again."
                .to_string()
        } else {
            "You're not on the notification list.".to_string()
        }
    }

    fn status(&self, caller: &RecipientId) -> String {
        let state = match self.runner.run_state() {
            RunState::Idle => "idle",
            RunState::Running => "running",
        };
        let subscribed = if self.registry.is_subscribed(caller) {
            "yes"
        } else {
            "no"
        };
        let stats = self.runner.stats();
        let last_run = match self.runner.last_run() {
            Some(run) => format!(
                "{} ({}, {})",
                run.outcome(),
                run.trigger.as_str(),
                format_timestamp(&run.finished_at)
            ),
            None => "none yet".to_string(),
        };

        let mut lines = vec![
            "Watcher status".to_string(),
            format!("Subscribed: {}", subscribed),
            format!("Detector: {}", state),
            format!("Check interval: {}", format_interval(self.interval)),
            format!("Trigger words: {}", self.trigger_list()),
            format!(
                "Active subscribers: {}",
                self.registry.active_subscribers().len()
            ),
            format!("Camera: {}", self.runner.source_location()),
            format!("Last run: {}", last_run),
        ];
        lines.push(format!(
            "Runs: {} completed, {} failed, {} skipped",
            stats.completed, stats.failed, stats.skipped
        ));
        lines.join("\n")
    }

    fn detect_reply(&self, summary: &RunSummary) -> String {
        if summary.skipped {
            return format!(
                "Detection skipped: {}. Subscribers will be alerted if it finds a match.",
                summary.reason.unwrap_or("already running")
            );
        }
        if let Some(err) = &summary.error {
            return format!(
                "Detection failed at the {} stage: {}\nIt will be retried automatically on the next cycle.",
                err.stage(),
                err
            );
        }
        let caption = summary.caption.as_deref().unwrap_or("");
        if !summary.is_match() {
            return format!(
                "Detection complete: no {} detected.\n\nCaption: {}",
                self.trigger_list(),
                caption
            );
        }

        let mut reply = format!(
            "Detection complete: {} detected!\nCaption: {}\nNotified {} subscriber(s).",
            summary.matched.join(", ").to_uppercase(),
            caption,
            summary.deliveries.delivered.len()
        );
        if !summary.deliveries.all_delivered() {
            reply.push_str(&format!(
                "\nDelivery failed for {} recipient(s); they will be retried on the next match.",
                summary.deliveries.failed.len()
            ));
        }
        reply
    }

    fn trigger_list(&self) -> String {
        self.runner.detector().triggers().words().join(", ")
    }
}

fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else if secs > 0 {
        format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
    } else {
        format!("{} ms", interval.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_slash_commands() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("stop"), Command::Stop);
        assert_eq!(Command::parse("/status@WatchBot"), Command::Status);
        assert_eq!(Command::parse("  /DETECT now "), Command::Detect);
        assert_eq!(Command::parse("d"), Command::Detect);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(
            Command::parse("hello there"),
            Command::Unknown("hello there".to_string())
        );
        assert_eq!(Command::parse(""), Command::Unknown(String::new()));
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for command in ["/start", "/stop", "/status", "/detect", "/help"] {
            assert!(help.contains(command), "missing {}", command);
        }
    }

    #[test]
    fn intervals_render_in_readable_units() {
        assert_eq!(format_interval(Duration::from_secs(300)), "5 minutes");
        assert_eq!(format_interval(Duration::from_secs(60)), "1 minute");
        assert_eq!(format_interval(Duration::from_secs(45)), "45 seconds");
        assert_eq!(format_interval(Duration::from_millis(250)), "250 ms");
    }
}
