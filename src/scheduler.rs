//! Repeating reminder timer.
//!
//! At most one timer runs at a time. Starting a new one aborts the previous
//! task, and every tick carries the generation of the timer that produced
//! it so a tick already queued by a cancelled timer can be told apart.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tracing::debug;

/// A reminder tick delivered to the page loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTick {
    pub generation: u64,
}

/// Owns the single live reminder task.
pub struct ReminderTimer {
    tx: mpsc::Sender<ReminderTick>,
    handle: Option<JoinHandle<()>>,
    generation: u64,
    period: Option<Duration>,
}

impl ReminderTimer {
    pub fn new(tx: mpsc::Sender<ReminderTick>) -> Self {
        Self {
            tx,
            handle: None,
            generation: 0,
            period: None,
        }
    }

    /// Cancel any running timer and start a new one firing every `period`.
    /// The first tick arrives one full period from now.
    pub fn start(&mut self, period: Duration) {
        self.cancel();
        self.generation += 1;
        self.period = Some(period);

        let tick = ReminderTick {
            generation: self.generation,
        };
        let tx = self.tx.clone();
        debug!(target: "reminder", generation = tick.generation, ?period, "timer started");

        self.handle = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(tick).await.is_err() {
                    // Page loop is gone.
                    break;
                }
            }
        }));
    }

    /// Stop the running timer, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(target: "reminder", generation = self.generation, "timer cancelled");
        }
        self.period = None;
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Period of the running timer.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Whether `tick` came from the timer that is currently running.
    pub fn is_current(&self, tick: ReminderTick) -> bool {
        self.is_running() && tick.generation == self.generation
    }
}

impl Drop for ReminderTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
