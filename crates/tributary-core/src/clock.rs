//! Time source and ticker used by the batcher.
//!
//! The batcher never reads the system clock directly. It asks a [`Clock`]
//! for a [`Ticker`], which keeps the time bound testable: [`TokioClock`]
//! is built on `tokio::time`, so tests that pause the runtime clock drive
//! every tick deterministically.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Source of the current time and of periodic tickers.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Creates a ticker that first fires one `period` from now.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `period` is zero.
    fn ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

/// A periodic timer that can be re-armed and stopped.
#[async_trait]
pub trait Ticker: Send {
    /// Waits for the next tick.
    ///
    /// Cancel safe. A stopped ticker never completes.
    async fn tick(&mut self);

    /// Re-arms the ticker so the next tick is one period from now.
    fn reset(&mut self);

    /// Stops the ticker permanently.
    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// TokioClock
// ---------------------------------------------------------------------------

/// [`Clock`] backed by the tokio timer wheel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        Box::new(TokioTicker::new(period))
    }
}

/// [`Ticker`] wrapping a [`tokio::time::Interval`].
#[derive(Debug)]
pub struct TokioTicker {
    interval: Option<Interval>,
}

impl TokioTicker {
    /// Creates a ticker whose first tick is one `period` from now.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Some(interval),
        }
    }

    /// Returns true once [`Ticker::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.interval.is_none()
    }
}

#[async_trait]
impl Ticker for TokioTicker {
    async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    fn reset(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.reset();
        }
    }

    fn stop(&mut self) {
        self.interval = None;
    }
}
