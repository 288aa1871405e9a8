use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::detect::TriggerSet;

const DEFAULT_CAMERA_URL: &str = "http://127.0.0.1:81/capture";
const DEFAULT_INTERVAL_SECS: u64 = 300;
/// Thirty days. Longer periods are almost certainly a unit mistake.
const MAX_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_CAMERA_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECOGNIZER_URL: &str = "http://127.0.0.1:8000/caption";
const DEFAULT_RECOGNIZER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TELEGRAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ARCHIVE_DIR: &str = "detections";

#[derive(Debug, Deserialize, Default)]
struct WatchwordConfigFile {
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    recognizer: Option<RecognizerConfigFile>,
    telegram: Option<TelegramConfigFile>,
    notify: Option<NotifyConfigFile>,
    archive: Option<ArchiveConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    endpoint: Option<String>,
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    trigger_words: Option<Vec<String>>,
    run_on_start: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct RecognizerConfigFile {
    kind: Option<String>,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    program: Option<String>,
    args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TelegramConfigFile {
    bot_token: Option<String>,
    notify_users: Option<Vec<UserIdFile>>,
    timeout_secs: Option<u64>,
}

/// Chat ids are numbers in Telegram's API but are often quoted by hand.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserIdFile {
    Number(i64),
    Text(String),
}

impl UserIdFile {
    fn into_string(self) -> String {
        match self {
            UserIdFile::Number(id) => id.to_string(),
            UserIdFile::Text(id) => id.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    attach_image: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ArchiveConfigFile {
    enabled: Option<bool>,
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WatchwordConfig {
    pub camera: CameraSettings,
    pub trigger_words: Vec<String>,
    pub run_on_start: bool,
    pub recognizer: RecognizerSettings,
    pub telegram: Option<TelegramSettings>,
    pub notify_users: Vec<String>,
    pub attach_image: bool,
    pub archive_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub endpoint: String,
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerSettings {
    Http { endpoint: String, timeout: Duration },
    Command {
        program: String,
        args: Vec<String>,
        timeout: Duration,
    },
}

#[derive(Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl WatchwordConfig {
    /// Loads from the file named by `WATCHWORD_CONFIG` (if set), then applies
    /// environment overrides and validates.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WATCHWORD_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validated trigger set built from `trigger_words`.
    pub fn trigger_set(&self) -> Result<TriggerSet> {
        TriggerSet::new(&self.trigger_words)
    }

    fn from_file(file: WatchwordConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            endpoint: camera_file
                .endpoint
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            interval: Duration::from_secs(
                camera_file.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
            ),
            timeout: Duration::from_secs(
                camera_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_CAMERA_TIMEOUT_SECS),
            ),
        };

        let detection = file.detection.unwrap_or_default();
        let recognizer = recognizer_settings(file.recognizer.unwrap_or_default())?;

        let telegram_file = file.telegram.unwrap_or_default();
        let telegram = telegram_file
            .bot_token
            .filter(|token| !token.trim().is_empty())
            .map(|token| TelegramSettings {
                bot_token: token.trim().to_string(),
                timeout: Duration::from_secs(
                    telegram_file
                        .timeout_secs
                        .unwrap_or(DEFAULT_TELEGRAM_TIMEOUT_SECS),
                ),
            });
        let notify_users = telegram_file
            .notify_users
            .unwrap_or_default()
            .into_iter()
            .map(UserIdFile::into_string)
            .filter(|id| !id.is_empty())
            .collect();

        let archive = file.archive.unwrap_or_default();
        let archive_dir = if archive.enabled.unwrap_or(false) {
            Some(
                archive
                    .dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_DIR)),
            )
        } else {
            None
        };

        Ok(Self {
            camera,
            trigger_words: detection.trigger_words.unwrap_or_default(),
            run_on_start: detection.run_on_start.unwrap_or(false),
            recognizer,
            telegram,
            notify_users,
            attach_image: file
                .notify
                .and_then(|notify| notify.attach_image)
                .unwrap_or(true),
            archive_dir,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("WATCHWORD_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.endpoint = url.trim().to_string();
            }
        }
        if let Ok(interval) = std::env::var("WATCHWORD_INTERVAL_SECS") {
            let seconds: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("WATCHWORD_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.camera.interval = Duration::from_secs(seconds);
        }
        if let Ok(words) = std::env::var("WATCHWORD_TRIGGER_WORDS") {
            let parsed = split_csv(&words);
            if !parsed.is_empty() {
                self.trigger_words = parsed;
            }
        }
        if let Ok(token) = std::env::var("WATCHWORD_TELEGRAM_TOKEN") {
            if !token.trim().is_empty() {
                let timeout = self
                    .telegram
                    .as_ref()
                    .map(|telegram| telegram.timeout)
                    .unwrap_or(Duration::from_secs(DEFAULT_TELEGRAM_TIMEOUT_SECS));
                self.telegram = Some(TelegramSettings {
                    bot_token: token.trim().to_string(),
                    timeout,
                });
            }
        }
        if let Ok(users) = std::env::var("WATCHWORD_NOTIFY_USERS") {
            let parsed = split_csv(&users);
            if !parsed.is_empty() {
                self.notify_users = parsed;
            }
        }
        if let Ok(dir) = std::env::var("WATCHWORD_ARCHIVE_DIR") {
            if !dir.trim().is_empty() {
                self.archive_dir = Some(PathBuf::from(dir.trim()));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let triggers = self.trigger_set()?;
        self.trigger_words = triggers.words().to_vec();

        if self.camera.interval.is_zero() {
            return Err(anyhow!("camera interval must be greater than zero"));
        }
        if self.camera.interval > Duration::from_secs(MAX_INTERVAL_SECS) {
            return Err(anyhow!(
                "camera interval must be at most {}s, got {}s",
                MAX_INTERVAL_SECS,
                self.camera.interval.as_secs()
            ));
        }
        if self.camera.timeout.is_zero() {
            return Err(anyhow!("camera timeout must be greater than zero"));
        }

        let url = Url::parse(&self.camera.endpoint)
            .map_err(|e| anyhow!("invalid camera endpoint '{}': {}", self.camera.endpoint, e))?;
        if !matches!(url.scheme(), "http" | "https" | "file") {
            return Err(anyhow!(
                "camera endpoint must use http, https or file, got '{}'",
                url.scheme()
            ));
        }

        let recognizer_timeout = match &self.recognizer {
            RecognizerSettings::Http { timeout, .. } | RecognizerSettings::Command { timeout, .. } => {
                *timeout
            }
        };
        if recognizer_timeout.is_zero() {
            return Err(anyhow!("recognizer timeout must be greater than zero"));
        }

        match &self.recognizer {
            RecognizerSettings::Http { endpoint, .. } => {
                let url = Url::parse(endpoint)
                    .map_err(|e| anyhow!("invalid recognizer endpoint '{}': {}", endpoint, e))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(anyhow!("recognizer endpoint must use http or https"));
                }
            }
            RecognizerSettings::Command { program, .. } => {
                if program.trim().is_empty() {
                    return Err(anyhow!("recognizer program must not be empty"));
                }
            }
        }
        Ok(())
    }
}

fn recognizer_settings(file: RecognizerConfigFile) -> Result<RecognizerSettings> {
    match file.kind.as_deref().unwrap_or("http") {
        "http" => Ok(RecognizerSettings::Http {
            endpoint: file
                .endpoint
                .unwrap_or_else(|| DEFAULT_RECOGNIZER_URL.to_string()),
            timeout: Duration::from_secs(
                file.timeout_secs
                    .unwrap_or(DEFAULT_RECOGNIZER_TIMEOUT_SECS),
            ),
        }),
        "command" => Ok(RecognizerSettings::Command {
            program: file
                .program
                .ok_or_else(|| anyhow!("recognizer.program is required for kind 'command'"))?,
            args: file.args.unwrap_or_default(),
            timeout: Duration::from_secs(
                file.timeout_secs
                    .unwrap_or(DEFAULT_RECOGNIZER_TIMEOUT_SECS),
            ),
        }),
        other => Err(anyhow!(
            "unsupported recognizer kind '{}'; expected http or command",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<WatchwordConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<WatchwordConfig> {
        let file: WatchwordConfigFile = serde_json::from_str(json)?;
        let mut cfg = WatchwordConfig::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse(r#"{"detection": {"trigger_words": ["cat"]}}"#).unwrap();
        assert_eq!(cfg.camera.endpoint, DEFAULT_CAMERA_URL);
        assert_eq!(cfg.camera.interval, Duration::from_secs(300));
        assert!(!cfg.run_on_start);
        assert!(cfg.attach_image);
        assert!(cfg.telegram.is_none());
        assert!(cfg.archive_dir.is_none());
        assert!(matches!(cfg.recognizer, RecognizerSettings::Http { .. }));
    }

    #[test]
    fn notify_users_accept_numbers_and_strings() {
        let cfg = parse(
            r#"{
                "detection": {"trigger_words": ["cat"]},
                "telegram": {"bot_token": "123:abc", "notify_users": [42, "-1001", " "]}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.notify_users, vec!["42", "-1001"]);
        assert!(!format!("{:?}", cfg.telegram).contains("123:abc"));
    }

    #[test]
    fn invalid_startup_values_are_fatal() {
        assert!(parse(r#"{}"#).is_err());
        assert!(parse(r#"{"detection": {"trigger_words": []}}"#).is_err());
        assert!(parse(
            r#"{"detection": {"trigger_words": ["cat"]}, "camera": {"interval_secs": 0}}"#
        )
        .is_err());
        assert!(parse(
            r#"{"detection": {"trigger_words": ["cat"]}, "camera": {"endpoint": "rtsp://cam/stream"}}"#
        )
        .is_err());
        assert!(parse(
            r#"{"detection": {"trigger_words": ["cat"]}, "recognizer": {"kind": "command"}}"#
        )
        .is_err());
        assert!(parse(
            r#"{"detection": {"trigger_words": ["cat"]}, "recognizer": {"kind": "onnx"}}"#
        )
        .is_err());
    }

    #[test]
    fn command_recognizer_settings() {
        let cfg = parse(
            r#"{
                "detection": {"trigger_words": ["cat"]},
                "recognizer": {"kind": "command", "program": "python3", "args": ["caption.py", "-"]}
            }"#,
        )
        .unwrap();
        assert_eq!(
            cfg.recognizer,
            RecognizerSettings::Command {
                program: "python3".to_string(),
                args: vec!["caption.py".to_string(), "-".to_string()],
                timeout: Duration::from_secs(60),
            }
        );

        let cfg = parse(
            r#"{
                "detection": {"trigger_words": ["cat"]},
                "recognizer": {"kind": "command", "program": "caption", "timeout_secs": 5}
            }"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.recognizer,
            RecognizerSettings::Command { timeout, .. } if timeout == Duration::from_secs(5)
        ));
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let err = parse(
            r#"{"detection": {"trigger_words": ["cat"]}, "camera": {"interval_secs": 18446744073709551615}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("at most"), "{}", err);

        let month = parse(
            r#"{"detection": {"trigger_words": ["cat"]}, "camera": {"interval_secs": 2592000}}"#,
        )
        .unwrap();
        assert_eq!(month.camera.interval, Duration::from_secs(MAX_INTERVAL_SECS));
    }

    #[test]
    fn zero_recognizer_timeout_is_rejected() {
        assert!(parse(
            r#"{"detection": {"trigger_words": ["cat"]}, "recognizer": {"kind": "command", "program": "caption", "timeout_secs": 0}}"#
        )
        .is_err());
    }

    #[test]
    fn archive_uses_default_dir_when_enabled() {
        let cfg = parse(
            r#"{"detection": {"trigger_words": ["cat"]}, "archive": {"enabled": true}}"#,
        )
        .unwrap();
        assert_eq!(cfg.archive_dir, Some(PathBuf::from(DEFAULT_ARCHIVE_DIR)));
    }
}
