//! Fixed-period tick source.
//!
//! The timer thread never runs the tick body itself: each tick is dispatched
//! onto its own worker thread, so a slow tick cannot delay the next one.
//! Overlap is resolved by the runner's single-flight guard, not here.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    timer: Option<JoinHandle<(Vec<JoinHandle<()>>, usize)>>,
    dispatched: Vec<JoinHandle<()>>,
    panicked: usize,
}

impl Scheduler {
    /// Starts ticking. The first tick fires one full interval from now.
    pub fn start<F>(interval: Duration, on_tick: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(anyhow!("schedule interval must be greater than zero"));
        }
        let first = Instant::now()
            .checked_add(interval)
            .ok_or_else(|| anyhow!("schedule interval {:?} is too large", interval))?;
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let on_tick = Arc::new(on_tick);
        let timer = std::thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || {
                let mut dispatched: Vec<JoinHandle<()>> = Vec::new();
                let mut panicked = 0;
                let mut next = first;
                let mut tick = 0u64;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    tick += 1;
                    let Some(following) = next.checked_add(interval) else {
                        log::error!("schedule clock overflowed after tick {}", tick);
                        break;
                    };
                    next = following;
                    panicked += reap_finished(&mut dispatched);

                    let on_tick = on_tick.clone();
                    let spawned = std::thread::Builder::new()
                        .name(format!("tick-{}", tick))
                        .spawn(move || (*on_tick)());
                    match spawned {
                        Ok(handle) => dispatched.push(handle),
                        Err(e) => log::error!("failed to dispatch tick {}: {}", tick, e),
                    }
                }
                log::debug!("scheduler stopped after {} tick(s)", tick);
                (dispatched, panicked)
            })?;
        log::info!("scheduling detection every {}s", interval.as_secs_f64());

        Ok(Self {
            interval,
            stop_tx: Some(stop_tx),
            timer: Some(timer),
            dispatched: Vec::new(),
            panicked: 0,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Cancels future ticks. Once this returns no further tick is dispatched;
    /// ticks dispatched earlier may still be executing.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(timer) = self.timer.take() {
            let (dispatched, panicked) = timer
                .join()
                .map_err(|_| anyhow!("scheduler thread panicked"))?;
            self.dispatched.extend(dispatched);
            self.panicked += panicked;
        }
        Ok(())
    }

    /// Waits for ticks dispatched before `stop` to finish. Returns how many
    /// ticks panicked over the scheduler's lifetime.
    pub fn join_dispatched(&mut self) -> usize {
        for handle in self.dispatched.drain(..) {
            if handle.join().is_err() {
                self.panicked += 1;
            }
        }
        if self.panicked > 0 {
            log::error!("{} scheduled tick(s) panicked", self.panicked);
        }
        self.panicked
    }
}

/// Joins ticks that already finished, keeping the rest.
fn reap_finished(dispatched: &mut Vec<JoinHandle<()>>) -> usize {
    let mut panicked = 0;
    let mut running = Vec::with_capacity(dispatched.len());
    for handle in dispatched.drain(..) {
        if !handle.is_finished() {
            running.push(handle);
        } else if handle.join().is_err() {
            panicked += 1;
        }
    }
    *dispatched = running;
    panicked
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("scheduler shutdown: {}", e);
        }
    }
}
