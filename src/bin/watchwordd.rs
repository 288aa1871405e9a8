//! watchwordd - camera trigger-word watcher daemon
//!
//! This daemon:
//! 1. Loads configuration (JSON file plus WATCHWORD_* overrides)
//! 2. Captions a camera snapshot every interval
//! 3. Alerts subscribers when a trigger word appears in the caption
//! 4. Answers /start, /stop, /status and /detect over Telegram and/or stdin

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use watchword::transport::{ConsoleCommands, ConsoleOutput, ConsoleRouter, TelegramClient};
use watchword::{
    open_source, CommandChannel, CommandRecognizer, DetectionRunner, Detector, HttpRecognizer,
    ImageArchive, NotificationChannel, Notifier, Orchestrator, OrchestratorOptions, RecipientId,
    RecognizerSettings, Recognizer, RunTrigger, SubscriptionRegistry, WatchwordConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Watch a camera for trigger words and alert subscribers")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "WATCHWORD_CONFIG")]
    config: Option<PathBuf>,

    /// Read commands from stdin and print replies and alerts to stdout.
    #[arg(long)]
    console: bool,

    /// Run a single detection pass, print the outcome and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = WatchwordConfig::load_from(args.config.as_deref())?;

    let triggers = config.trigger_set()?;
    let recognizer: Arc<dyn Recognizer> = match &config.recognizer {
        RecognizerSettings::Http { endpoint, timeout } => {
            Arc::new(HttpRecognizer::new(endpoint.clone(), *timeout))
        }
        RecognizerSettings::Command {
            program,
            args,
            timeout,
        } => Arc::new(CommandRecognizer::new(program.clone(), args.clone()).with_timeout(*timeout)),
    };
    log::info!(
        "recognizer={}, trigger words: {}",
        recognizer.name(),
        triggers.words().join(", ")
    );
    let detector = Detector::new(triggers, recognizer);
    let source = open_source(&config.camera.endpoint, config.camera.timeout)?;

    let telegram = match &config.telegram {
        Some(settings) => Some(TelegramClient::new(
            settings.bot_token.clone(),
            settings.timeout,
        )?),
        None => None,
    };
    if telegram.is_none() && !args.console && !args.once {
        return Err(anyhow!(
            "no command channel configured; set WATCHWORD_TELEGRAM_TOKEN or pass --console"
        ));
    }

    let remote = telegram
        .clone()
        .map(|client| Arc::new(client) as Arc<dyn NotificationChannel>);
    let channel: Arc<dyn NotificationChannel> = if args.console || args.once {
        Arc::new(ConsoleRouter::new(remote))
    } else {
        remote.ok_or_else(|| anyhow!("telegram notification channel missing"))?
    };

    let registry = Arc::new(SubscriptionRegistry::with_subscribers(
        config.notify_users.iter().cloned().map(RecipientId::from),
    ));
    if args.console || args.once {
        registry.subscribe(&RecipientId::from(watchword::transport::CONSOLE_CALLER));
    }
    log::info!(
        "{} subscriber(s) preconfigured",
        registry.active_subscribers().len()
    );

    let mut runner = DetectionRunner::new(
        source,
        detector,
        Notifier::new(channel, config.attach_image),
        registry.clone(),
    );
    if let Some(dir) = &config.archive_dir {
        runner = runner.with_archive(ImageArchive::open(dir)?);
    }
    let runner = Arc::new(runner);

    if args.once {
        let summary = runner.run_once(RunTrigger::Manual);
        println!("{}", summary.outcome());
        return match summary.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        };
    }

    let mut channels = Vec::new();
    if let Some(client) = &telegram {
        channels.push(CommandChannel::new(
            Box::new(client.updates()),
            Arc::new(client.clone()),
        ));
    }
    if args.console {
        channels.push(CommandChannel::new(
            Box::new(ConsoleCommands::stdin()?),
            Arc::new(ConsoleOutput),
        ));
    }

    let options = OrchestratorOptions {
        run_on_start: config.run_on_start,
        ..OrchestratorOptions::new(config.camera.interval)
    };
    let orchestrator = Orchestrator::start(runner, registry, channels, options)?;
    log::info!(
        "watchwordd running. camera {}, every {}s",
        config.camera.endpoint,
        config.camera.interval.as_secs()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("watchwordd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, finishing in-flight work...");
    orchestrator.shutdown()
}
