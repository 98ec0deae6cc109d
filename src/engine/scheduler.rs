//! Periodic cycle timer.
//!
//! Fires once immediately on start and then every `period`. `reset()`
//! pushes the next tick a full period into the future, which an
//! on-demand scan uses so the periodic cycle does not follow right
//! behind it.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

enum TimerCommand {
    Reset,
    Stop,
}

pub struct Scheduler {
    period: Duration,
    control: Mutex<Option<mpsc::UnboundedSender<TimerCommand>>>,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            control: Mutex::new(None),
        }
    }

    /// Spawn the timer task. Returns `false` if it is already running.
    ///
    /// `tick` is awaited to completion before the next tick is considered,
    /// so ticks never overlap.
    pub fn start<F, Fut>(&self, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if control.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return false;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        *control = Some(tx);

        let period = self.period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs(), "Scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    cmd = rx.recv() => match cmd {
                        Some(TimerCommand::Reset) => {
                            debug!("Scheduler timer reset");
                            interval.reset();
                        }
                        Some(TimerCommand::Stop) | None => break,
                    },
                }
            }

            info!("Scheduler stopped");
        });

        true
    }

    /// Restart the countdown to the next tick.
    pub fn reset(&self) {
        self.send(TimerCommand::Reset);
    }

    pub fn stop(&self) {
        self.send(TimerCommand::Stop);
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_running(&self) -> bool {
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, cmd: TimerCommand) {
        if let Some(tx) = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(cmd);
        }
    }
}
