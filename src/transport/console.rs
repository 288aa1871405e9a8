//! Local terminal transport.
//!
//! Each stdin line is a command from the `console` caller (a bare `d` runs a
//! detection). Replies and alerts are printed to stdout.

use anyhow::Result;
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::command::{CommandSource, InboundCommand, ResponseSink};
use crate::error::DeliveryError;
use crate::notify::NotificationChannel;
use crate::subscriber::RecipientId;

pub const CONSOLE_CALLER: &str = "console";

pub struct ConsoleCommands {
    lines: Receiver<String>,
    closed: bool,
}

impl ConsoleCommands {
    /// Starts a detached reader thread on stdin.
    pub fn stdin() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("console-input".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self::from_receiver(rx))
    }

    pub fn from_receiver(lines: Receiver<String>) -> Self {
        Self {
            lines,
            closed: false,
        }
    }
}

impl CommandSource for ConsoleCommands {
    fn name(&self) -> &'static str {
        "console"
    }

    fn poll(&mut self, wait: Duration) -> Result<Vec<InboundCommand>> {
        if self.closed {
            std::thread::sleep(wait);
            return Ok(Vec::new());
        }
        let first = match self.lines.recv_timeout(wait) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("console input closed");
                self.closed = true;
                return Ok(Vec::new());
            }
        };
        let commands = std::iter::once(first)
            .chain(self.lines.try_iter())
            .filter(|line| !line.trim().is_empty())
            .map(|line| InboundCommand::new(CONSOLE_CALLER, line))
            .collect();
        Ok(commands)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleOutput;

impl ConsoleOutput {
    fn print(&self, text: &str) -> std::io::Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", text)?;
        out.flush()
    }
}

impl ResponseSink for ConsoleOutput {
    fn reply(&self, _caller: &RecipientId, text: &str) -> Result<()> {
        self.print(text)?;
        Ok(())
    }
}

impl NotificationChannel for ConsoleOutput {
    fn name(&self) -> &'static str {
        "console"
    }

    fn send(
        &self,
        recipient: &RecipientId,
        text: &str,
        image: Option<&[u8]>,
    ) -> Result<(), DeliveryError> {
        let attachment = image
            .map(|bytes| format!("\n[image attached: {} bytes]", bytes.len()))
            .unwrap_or_default();
        self.print(&format!("[alert for {}]\n{}{}", recipient, text, attachment))
            .map_err(DeliveryError::new)
    }
}

/// Sends alerts for the console caller to stdout and everything else to the
/// remote channel. Without a remote channel every alert is printed.
pub struct ConsoleRouter {
    console: ConsoleOutput,
    remote: Option<Arc<dyn NotificationChannel>>,
}

impl ConsoleRouter {
    pub fn new(remote: Option<Arc<dyn NotificationChannel>>) -> Self {
        Self {
            console: ConsoleOutput,
            remote,
        }
    }
}

impl NotificationChannel for ConsoleRouter {
    fn name(&self) -> &'static str {
        self.remote
            .as_ref()
            .map(|remote| remote.name())
            .unwrap_or("console")
    }

    fn send(
        &self,
        recipient: &RecipientId,
        text: &str,
        image: Option<&[u8]>,
    ) -> Result<(), DeliveryError> {
        match &self.remote {
            Some(remote) if recipient.as_str() != CONSOLE_CALLER => {
                remote.send(recipient, text, image)
            }
            _ => self.console.send(recipient, text, image),
        }
    }
}
