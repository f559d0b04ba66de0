//! Round scheduling.
//!
//! A scheduler only says *when*; the coordinator decides what a tick
//! means. [`ManualScheduler`] fires on demand, so tests drive rounds
//! without waiting on the wall clock. [`IntervalScheduler`] fires on a
//! fixed cadence until shut down.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

#[async_trait]
pub trait RoundScheduler: Send {
    /// Wait for the next tick. `None` once the scheduler is shut down.
    async fn next_tick(&mut self) -> Option<DateTime<Utc>>;
}

// ---------------------------------------------------------------------------
// Manual
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ManualScheduler {
    rx: mpsc::UnboundedReceiver<DateTime<Utc>>,
}

/// Fires ticks into a [`ManualScheduler`]. Dropping every trigger shuts the
/// scheduler down.
#[derive(Debug, Clone)]
pub struct ManualTrigger {
    tx: mpsc::UnboundedSender<DateTime<Utc>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> (Self, ManualTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTrigger { tx })
    }
}

impl ManualTrigger {
    /// Queue a tick stamped `at`. Returns false if the scheduler is gone.
    pub fn fire(&self, at: DateTime<Utc>) -> bool {
        self.tx.send(at).is_ok()
    }
}

#[async_trait]
impl RoundScheduler for ManualScheduler {
    async fn next_tick(&mut self) -> Option<DateTime<Utc>> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct IntervalScheduler {
    interval: Interval,
    shutdown: watch::Receiver<bool>,
}

impl IntervalScheduler {
    /// First tick one `period` from now. Missed ticks are skipped, never
    /// bunched. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, shutdown }
    }
}

#[async_trait]
impl RoundScheduler for IntervalScheduler {
    async fn next_tick(&mut self) -> Option<DateTime<Utc>> {
        if *self.shutdown.borrow() {
            return None;
        }
        tokio::select! {
            _ = self.interval.tick() => Some(Utc::now()),
            _ = self.shutdown.changed() => None,
        }
    }
}
