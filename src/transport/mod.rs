//! Command and notification transports.
//!
//! - Telegram Bot API (alerts, command replies, `getUpdates` command stream)
//! - Local console (stdin commands, stdout replies and alerts)

pub mod console;
pub mod telegram;

pub use console::{ConsoleCommands, ConsoleOutput, ConsoleRouter, CONSOLE_CALLER};
pub use telegram::{TelegramClient, TelegramUpdates};
