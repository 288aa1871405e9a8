use chrono::{DateTime, Local};

use crate::detect::DetectionResult;

pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Alert text sent to subscribers on a match.
pub fn format_alert(result: &DetectionResult) -> String {
    let headline = result
        .primary_trigger()
        .map(str::to_uppercase)
        .unwrap_or_else(|| "OBJECT".to_string());
    let mut text = format!("{} DETECTED!\n", headline);
    if result.matched.len() > 1 {
        text.push_str(&format!("Triggers: {}\n", result.matched.join(", ")));
    }
    text.push_str(&format!("Caption: {}\n", result.caption));
    text.push_str(&format!("\nTimestamp: {}", format_timestamp(&result.timestamp)));
    text
}
