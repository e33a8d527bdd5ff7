//! Randomized, cancellable spacing between dispatch attempts.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Inclusive range of whole seconds between two dispatches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl DelayRange {
    pub fn fixed(secs: u64) -> Self {
        Self {
            min: secs,
            max: secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    Elapsed(Duration),
    Cancelled,
}

#[derive(Debug)]
pub struct Pacer {
    range: DelayRange,
    rng: StdRng,
}

impl Pacer {
    pub fn new(range: DelayRange) -> Self {
        Self {
            range,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(range: DelayRange, seed: u64) -> Self {
        Self {
            range,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let (lo, hi) = (self.range.min, self.range.max.max(self.range.min));
        Duration::from_secs(self.rng.gen_range(lo..=hi))
    }

    /// Sleep for the next delay unless `cancel` fires first. Cancellation is
    /// observed on entry, while sleeping, and on exit.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> PaceOutcome {
        if cancel.is_cancelled() {
            return PaceOutcome::Cancelled;
        }
        let delay = self.next_delay();
        debug!(delay_secs = delay.as_secs(), "pacing before next dispatch");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PaceOutcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
        if cancel.is_cancelled() {
            return PaceOutcome::Cancelled;
        }
        PaceOutcome::Elapsed(delay)
    }
}
