use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::state::AggregatorState;

/// Why a flush was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    Threshold,
    Delay,
    Manual,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    Flush(Trigger),
    ArmTimer(Duration),
}

/// Slot for the single deferred-flush timer. The token is the handle: cancelling it
/// stops the sleeping timer task.
#[derive(Debug, Default)]
pub struct TimerSlot {
    token: Option<CancellationToken>,
}

impl TimerSlot {
    pub fn is_armed(&self) -> bool {
        self.token.is_some()
    }

    /// No-op if a timer is already live. Arming never postpones an existing deadline.
    pub fn arm(&mut self, token: CancellationToken) -> bool {
        if self.token.is_some() {
            return false;
        }
        self.token = Some(token);
        true
    }

    /// Cancels and clears the live timer. Returns true if one was armed.
    pub fn cancel(&mut self) -> bool {
        match self.token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

pub struct Scheduler {
    batch_threshold: usize,
    batch_delay: Duration,
}

impl Scheduler {
    pub fn new(batch_threshold: usize, batch_delay: Duration) -> Self {
        Self {
            batch_threshold: batch_threshold.max(1),
            batch_delay,
        }
    }

    pub fn batch_threshold(&self) -> usize {
        self.batch_threshold
    }

    /// Pure Projection: State -> SideEffect.
    /// Run after every pending-set mutation and after every flush settles.
    pub fn evaluate(&self, state: &AggregatorState) -> Option<SideEffect> {
        if state.closed || state.processing || state.pending.is_empty() {
            return None;
        }

        if state.pending.len() >= self.batch_threshold {
            return Some(SideEffect::Flush(Trigger::Threshold));
        }

        if state.timer.is_armed() {
            // Debounce: the live timer keeps its original deadline.
            return None;
        }

        Some(SideEffect::ArmTimer(self.batch_delay))
    }
}
