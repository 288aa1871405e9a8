//! Process lifecycle: scheduler, command loops and graceful shutdown.
//!
//! Shutdown order: stop the scheduler, stop accepting commands, then wait
//! for whatever pass is still in flight to reach Idle.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::command::{Command, CommandDispatcher, CommandSource, InboundCommand, ResponseSink};
use crate::runner::{DetectionRunner, RunTrigger};
use crate::scheduler::Scheduler;
use crate::subscriber::SubscriptionRegistry;

const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(2);
const MAX_POLL_BACKOFF: Duration = Duration::from_secs(30);

pub const DETECT_ACK: &str = "Triggering manual detection...";

/// A command stream paired with the transport that answers it.
pub struct CommandChannel {
    pub source: Box<dyn CommandSource>,
    pub sink: Arc<dyn ResponseSink>,
}

impl CommandChannel {
    pub fn new(source: Box<dyn CommandSource>, sink: Arc<dyn ResponseSink>) -> Self {
        Self { source, sink }
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorOptions {
    pub interval: Duration,
    pub run_on_start: bool,
    /// Upper bound on how long a command loop waits before re-checking the
    /// shutdown flag.
    pub poll_wait: Duration,
}

impl OrchestratorOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            run_on_start: false,
            poll_wait: DEFAULT_POLL_WAIT,
        }
    }
}

type Workers = Arc<Mutex<Vec<JoinHandle<()>>>>;

pub struct Orchestrator {
    runner: Arc<DetectionRunner>,
    registry: Arc<SubscriptionRegistry>,
    scheduler: Scheduler,
    shutdown: Arc<AtomicBool>,
    loops: Vec<JoinHandle<()>>,
    workers: Workers,
}

impl Orchestrator {
    pub fn start(
        runner: Arc<DetectionRunner>,
        registry: Arc<SubscriptionRegistry>,
        channels: Vec<CommandChannel>,
        options: OrchestratorOptions,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let workers: Workers = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(CommandDispatcher::new(
            registry.clone(),
            runner.clone(),
            options.interval,
        ));

        let tick_runner = runner.clone();
        let scheduler = Scheduler::start(options.interval, move || {
            tick_runner.run_once(RunTrigger::Scheduled);
        })?;

        if options.run_on_start {
            let startup_runner = runner.clone();
            let handle = std::thread::Builder::new()
                .name("startup-run".to_string())
                .spawn(move || {
                    startup_runner.run_once(RunTrigger::Scheduled);
                })?;
            push_worker(&workers, handle);
        }

        let poll_wait = options.poll_wait.max(Duration::from_millis(1));
        let mut loops = Vec::with_capacity(channels.len());
        for channel in channels {
            let name = channel.source.name();
            let command_loop = CommandLoop {
                channel,
                dispatcher: dispatcher.clone(),
                shutdown: shutdown.clone(),
                workers: workers.clone(),
                poll_wait,
            };
            let handle = std::thread::Builder::new()
                .name(format!("commands-{}", name))
                .spawn(move || command_loop.run())?;
            loops.push(handle);
            log::info!("accepting commands from {}", name);
        }

        Ok(Self {
            runner,
            registry,
            scheduler,
            shutdown,
            loops,
            workers,
        })
    }

    pub fn runner(&self) -> &Arc<DetectionRunner> {
        &self.runner
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Stops ticks and command intake, then waits for in-flight work.
    pub fn shutdown(mut self) -> Result<()> {
        log::info!("shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        let mut panicked = 0usize;
        if let Err(e) = self.scheduler.stop() {
            log::error!("scheduler stop failed: {:#}", e);
            panicked += 1;
        }

        for handle in self.loops.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        panicked += self.scheduler.join_dispatched();
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in workers {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        self.runner.wait_idle();
        log::info!("shutdown complete");

        if panicked > 0 {
            return Err(anyhow!("{} background thread(s) panicked", panicked));
        }
        Ok(())
    }
}

struct CommandLoop {
    channel: CommandChannel,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: Arc<AtomicBool>,
    workers: Workers,
    poll_wait: Duration,
}

impl CommandLoop {
    fn run(mut self) {
        let name = self.channel.source.name();
        let mut backoff = Duration::from_secs(1);
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.channel.source.poll(self.poll_wait) {
                Ok(commands) => {
                    backoff = Duration::from_secs(1);
                    for command in commands {
                        if self.shutdown.load(Ordering::SeqCst) {
                            log::info!("{}: dropping command received during shutdown", name);
                            break;
                        }
                        self.handle(command);
                    }
                }
                Err(e) => {
                    log::warn!("{} poll failed: {:#}; retrying in {}s", name, e, backoff.as_secs());
                    self.sleep_unless_shutdown(backoff);
                    backoff = (backoff * 2).min(MAX_POLL_BACKOFF);
                }
            }
        }
        log::debug!("{} command loop stopped", name);
    }

    fn handle(&self, inbound: InboundCommand) {
        let command = Command::parse(&inbound.text);
        if command != Command::Detect {
            let reply = self.dispatcher.dispatch(&inbound.caller, &command);
            send_reply(self.channel.sink.as_ref(), &inbound, &reply);
            return;
        }

        // A pass can take as long as the recognizer does; run it off the loop.
        send_reply(self.channel.sink.as_ref(), &inbound, DETECT_ACK);
        let dispatcher = self.dispatcher.clone();
        let sink = self.channel.sink.clone();
        let spawned = std::thread::Builder::new()
            .name("manual-detect".to_string())
            .spawn(move || {
                let reply = dispatcher.dispatch(&inbound.caller, &Command::Detect);
                send_reply(sink.as_ref(), &inbound, &reply);
            });
        match spawned {
            Ok(handle) => push_worker(&self.workers, handle),
            Err(e) => log::error!("failed to start manual detection: {}", e),
        }
    }

    fn sleep_unless_shutdown(&self, total: Duration) {
        let step = Duration::from_millis(100);
        let mut slept = Duration::ZERO;
        while slept < total && !self.shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(step);
            slept += step;
        }
    }
}

fn send_reply(sink: &dyn ResponseSink, inbound: &InboundCommand, text: &str) {
    if let Err(e) = sink.reply(&inbound.caller, text) {
        log::warn!("reply to {} failed: {:#}", inbound.caller, e);
    }
}

fn push_worker(workers: &Workers, handle: JoinHandle<()>) {
    let mut workers = workers.lock().unwrap_or_else(PoisonError::into_inner);
    workers.retain(|handle| !handle.is_finished());
    workers.push(handle);
}
