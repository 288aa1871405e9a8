use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use watchword::config::{RecognizerSettings, WatchwordConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WATCHWORD_CONFIG",
        "WATCHWORD_CAMERA_URL",
        "WATCHWORD_INTERVAL_SECS",
        "WATCHWORD_TRIGGER_WORDS",
        "WATCHWORD_TELEGRAM_TOKEN",
        "WATCHWORD_NOTIFY_USERS",
        "WATCHWORD_ARCHIVE_DIR",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "camera": {
                "endpoint": "http://192.168.1.40/capture",
                "interval_secs": 120,
                "timeout_secs": 5
            },
            "detection": {
                "trigger_words": ["cat", "kitten", "CAT"],
                "run_on_start": true
            },
            "recognizer": {
                "kind": "http",
                "endpoint": "http://127.0.0.1:9000/describe",
                "timeout_secs": 30
            },
            "telegram": {
                "bot_token": "123:file-token",
                "notify_users": [1111, "2222"]
            },
            "notify": {"attach_image": false}
        }"#,
    );

    std::env::set_var("WATCHWORD_CONFIG", file.path());
    std::env::set_var("WATCHWORD_INTERVAL_SECS", "60");
    std::env::set_var("WATCHWORD_TELEGRAM_TOKEN", "456:env-token");
    std::env::set_var("WATCHWORD_ARCHIVE_DIR", "/var/lib/watchword");

    let cfg = WatchwordConfig::load().expect("load config");

    assert_eq!(cfg.camera.endpoint, "http://192.168.1.40/capture");
    assert_eq!(cfg.camera.interval, Duration::from_secs(60));
    assert_eq!(cfg.camera.timeout, Duration::from_secs(5));
    assert_eq!(cfg.trigger_words, vec!["cat", "kitten"]);
    assert!(cfg.run_on_start);
    assert_eq!(
        cfg.recognizer,
        RecognizerSettings::Http {
            endpoint: "http://127.0.0.1:9000/describe".to_string(),
            timeout: Duration::from_secs(30),
        }
    );
    assert_eq!(cfg.telegram.as_ref().unwrap().bot_token, "456:env-token");
    assert_eq!(cfg.notify_users, vec!["1111", "2222"]);
    assert!(!cfg.attach_image);
    assert_eq!(cfg.archive_dir, Some(PathBuf::from("/var/lib/watchword")));

    clear_env();
}

#[test]
fn env_alone_is_enough_to_run() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WATCHWORD_TRIGGER_WORDS", "cat, kitten ,");
    std::env::set_var("WATCHWORD_NOTIFY_USERS", "42,43");
    std::env::set_var("WATCHWORD_CAMERA_URL", "file:///tmp/snapshot.jpg");

    let cfg = WatchwordConfig::load().expect("load config");

    assert_eq!(cfg.trigger_words, vec!["cat", "kitten"]);
    assert_eq!(cfg.notify_users, vec!["42", "43"]);
    assert_eq!(cfg.camera.endpoint, "file:///tmp/snapshot.jpg");
    assert_eq!(cfg.camera.interval, Duration::from_secs(300));
    assert!(cfg.telegram.is_none());
    assert_eq!(cfg.trigger_set().unwrap().len(), 2);

    clear_env();
}

#[test]
fn rejects_missing_trigger_words_and_zero_interval() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = WatchwordConfig::load().unwrap_err();
    assert!(err.to_string().contains("trigger word"));

    std::env::set_var("WATCHWORD_TRIGGER_WORDS", "cat");
    std::env::set_var("WATCHWORD_INTERVAL_SECS", "0");
    let err = WatchwordConfig::load().unwrap_err();
    assert!(err.to_string().contains("interval"));

    std::env::set_var("WATCHWORD_INTERVAL_SECS", "five");
    assert!(WatchwordConfig::load().is_err());

    std::env::set_var("WATCHWORD_INTERVAL_SECS", "18446744073709551615");
    let err = WatchwordConfig::load().unwrap_err();
    assert!(err.to_string().contains("at most"), "{}", err);

    clear_env();
}

#[test]
fn rejects_malformed_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{"detection": {"trigger_words": "cat"}}"#);
    let err = WatchwordConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
