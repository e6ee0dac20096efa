use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::counts::ConfirmedCountStore;
use super::item::ItemId;
use super::pending::PendingSet;
use super::scheduler::TimerSlot;

/// Strict state delta. This is the ONLY way aggregator state mutates.
#[derive(Debug, Clone)]
pub enum StateDelta {
    ViewRecorded(ItemId),
    CountSeeded { id: ItemId, count: u64 },
    TimerArmed(CancellationToken),
    TimerCleared,
    /// Raises the processing flag and disarms the timer.
    FlushStarted,
    /// Server returned per-item counts for the batch.
    BatchConfirmed { batch: Vec<ItemId>, counts: HashMap<ItemId, u64> },
    /// Server acknowledged the batch without counts.
    BatchAcknowledged { batch: Vec<ItemId> },
    FlushFailed,
    Closed,
}

#[derive(Debug, Default)]
pub struct AggregatorState {
    pub pending: PendingSet,
    pub counts: ConfirmedCountStore,
    pub timer: TimerSlot,
    /// True exactly while one flush is in flight.
    pub processing: bool,
    pub closed: bool,
}

impl AggregatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure reduction: State + Delta -> Mutated State
    pub fn reduce(&mut self, delta: StateDelta) {
        match delta {
            StateDelta::ViewRecorded(id) => {
                self.pending.insert(id);
            }
            StateDelta::CountSeeded { id, count } => {
                if !self.counts.seed(id.clone(), count) {
                    debug!(item = %id, "Seed ignored; item already seeded or confirmed");
                }
            }
            StateDelta::TimerArmed(token) => {
                self.timer.arm(token);
            }
            StateDelta::TimerCleared => {
                self.timer.cancel();
            }
            StateDelta::FlushStarted => {
                self.processing = true;
                self.timer.cancel();
            }
            StateDelta::BatchConfirmed { batch, counts } => {
                for id in &batch {
                    // Items the server left out keep their current count.
                    if let Some(&count) = counts.get(id) {
                        self.counts.confirm(id.clone(), count);
                    }
                }
                self.pending.remove_all(&batch);
                self.processing = false;
            }
            StateDelta::BatchAcknowledged { batch } => {
                for id in &batch {
                    self.counts.increment(id.clone());
                }
                self.pending.remove_all(&batch);
                self.processing = false;
            }
            StateDelta::FlushFailed => {
                // Pending set is left exactly as it is; the batch retries next cycle.
                self.processing = false;
            }
            StateDelta::Closed => {
                self.closed = true;
                self.timer.cancel();
            }
        }
    }
}
