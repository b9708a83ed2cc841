//! Outbound pacing for the dispatch loop
//!
//! The gate hands out one turn at a time:
//! - waits until `interval` has passed since the previous turn was granted
//! - then waits a uniformly random jitter in `[jitter_min, jitter_max]`
//! - honours the stop signal during both waits
//!
//! The interval runs from the end of the previous grant, so time spent in
//! generation and sending counts toward it.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

use crate::application::utils::{StopSignal, wait_with_abort};
use crate::domain::config::PacingConfig;
use crate::domain::error::{DispatchError, DispatchResult};

pub struct RateGate {
    /// Minimum spacing between consecutive grants
    interval: Duration,
    jitter_min: Duration,
    jitter_max: Duration,
    /// Earliest instant the next turn may start its jitter wait
    next_allowed: Option<Instant>,
}

impl RateGate {
    pub fn from_config(config: &PacingConfig) -> Self {
        Self::new(
            Duration::from_secs(config.interval_secs),
            Duration::from_secs(config.jitter_min_secs),
            Duration::from_secs(config.jitter_max_secs),
        )
    }

    pub fn new(interval: Duration, jitter_min: Duration, jitter_max: Duration) -> Self {
        let (jitter_min, jitter_max) = if jitter_min <= jitter_max {
            (jitter_min, jitter_max)
        } else {
            (jitter_max, jitter_min)
        };
        Self {
            interval,
            jitter_min,
            jitter_max,
            next_allowed: None,
        }
    }

    /// Account for a grant made `elapsed` ago, e.g. by a previous process.
    pub fn seed_elapsed(&mut self, elapsed: Duration) {
        self.next_allowed = Some(Instant::now() + self.interval.saturating_sub(elapsed));
    }

    /// Time left before the interval since the last grant has passed.
    pub fn remaining(&self) -> Duration {
        self.next_allowed
            .map(|next| next.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Suspend until the caller may dispatch. Fails only when stopped.
    pub async fn await_turn(&mut self, stop: &mut StopSignal) -> DispatchResult<()> {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            tracing::debug!("Rate gate: waiting {:?} for interval", remaining);
            if wait_with_abort(remaining, stop).await {
                return Err(DispatchError::Stopped);
            }
        }

        let jitter = self.jitter();
        if wait_with_abort(jitter, stop).await {
            return Err(DispatchError::Stopped);
        }

        self.next_allowed = Some(Instant::now() + self.interval);
        Ok(())
    }

    fn jitter(&self) -> Duration {
        let lo = self.jitter_min.as_millis() as u64;
        let hi = self.jitter_max.as_millis() as u64;
        if lo == hi {
            return self.jitter_min;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}
