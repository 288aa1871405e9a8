//! Match notifications.
//!
//! `Notifier` formats a detection result and delivers it to a snapshot of
//! recipients through a `NotificationChannel`. Recipients are independent:
//! a failed delivery is recorded and the loop moves on.

mod message;

pub use message::{format_alert, format_timestamp};

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::detect::DetectionResult;
use crate::error::DeliveryError;
use crate::subscriber::RecipientId;

/// Outbound notification transport.
pub trait NotificationChannel: Send + Sync {
    /// Transport identifier for logs.
    fn name(&self) -> &'static str;

    fn send(
        &self,
        recipient: &RecipientId,
        text: &str,
        image: Option<&[u8]>,
    ) -> Result<(), DeliveryError>;
}

/// Per-recipient outcome of one `notify` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<RecipientId>,
    pub failed: Vec<(RecipientId, DeliveryError)>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
    attach_image: bool,
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>, attach_image: bool) -> Self {
        Self {
            channel,
            attach_image,
        }
    }

    /// Sends one alert per recipient. Never retries; the next run pass does.
    pub fn notify(
        &self,
        result: &DetectionResult,
        recipients: &BTreeSet<RecipientId>,
    ) -> DeliveryReport {
        let text = format_alert(result);
        let image = self.attach_image.then(|| result.snapshot.bytes());
        let mut report = DeliveryReport::default();

        for recipient in recipients {
            match self.channel.send(recipient, &text, image) {
                Ok(()) => {
                    log::info!("notification sent to {} via {}", recipient, self.channel.name());
                    report.delivered.push(recipient.clone());
                }
                Err(err) => {
                    log::error!("failed to notify {}: {}", recipient, err);
                    report.failed.push((recipient.clone(), err));
                }
            }
        }
        report
    }
}
