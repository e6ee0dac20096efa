use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::item::ItemId;
use super::scheduler::Trigger;
use super::state::{AggregatorState, StateDelta};
use super::telemetry::event::{SettleKind, TelemetryEvent};
use super::telemetry::recorder::TelemetryRecorder;
use crate::error::SubmitError;

/// Successful endpoint reply. `updated_counts` is absent on the degraded shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchAck {
    pub updated_counts: Option<HashMap<ItemId, u64>>,
}

impl BatchAck {
    pub fn with_counts(counts: HashMap<ItemId, u64>) -> Self {
        Self {
            updated_counts: Some(counts),
        }
    }

    pub fn without_counts() -> Self {
        Self::default()
    }
}

/// Snapshot of the pending set taken when a flush starts.
#[derive(Debug, Clone)]
pub struct InFlightBatch {
    pub id: Uuid,
    pub items: Vec<ItemId>,
    pub trigger: Trigger,
    pub started_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Another flush is still in flight.
    InFlight,
    Empty,
    /// The aggregator has been shut down.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Confirmed { batch_id: Uuid, size: usize },
    Degraded { batch_id: Uuid, size: usize },
    Failed { batch_id: Uuid, size: usize, error: String },
    Skipped(SkipReason),
    /// The submission finished after the aggregator was released.
    Discarded { batch_id: Uuid },
    /// The submission task was torn down with its runtime.
    Abandoned,
}

impl FlushOutcome {
    /// True when the endpoint accepted the batch.
    pub fn is_success(&self) -> bool {
        matches!(self, FlushOutcome::Confirmed { .. } | FlushOutcome::Degraded { .. })
    }
}

/// The flush operation split around its one suspension point: `begin` runs before
/// the submission, `reconcile` after it. Both run under the aggregator lock.
pub struct BatchProcessor;

impl BatchProcessor {
    /// Raise the processing flag, disarm the timer, snapshot the pending set.
    /// The pending set is NOT drained here.
    pub fn begin(
        state: &mut AggregatorState,
        telemetry: &mut TelemetryRecorder,
        trigger: Trigger,
    ) -> Result<InFlightBatch, SkipReason> {
        let skip = if state.closed && trigger != Trigger::Teardown {
            Some(SkipReason::Closed)
        } else if state.processing {
            Some(SkipReason::InFlight)
        } else if state.pending.is_empty() {
            Some(SkipReason::Empty)
        } else {
            None
        };

        if let Some(reason) = skip {
            debug!(?trigger, ?reason, "Flush skipped");
            telemetry.record(TelemetryEvent::FlushSkipped { trigger, reason });
            return Err(reason);
        }

        if state.timer.is_armed() {
            telemetry.record(TelemetryEvent::TimerCanceled);
        }
        state.reduce(StateDelta::FlushStarted);

        let batch = InFlightBatch {
            id: Uuid::new_v4(),
            items: state.pending.snapshot(),
            trigger,
            started_at: Instant::now(),
        };

        telemetry.record(TelemetryEvent::TriggerFired {
            trigger,
            pending: batch.items.len(),
        });
        telemetry.record(TelemetryEvent::BatchSubmitted {
            batch_id: batch.id,
            size: batch.items.len(),
        });
        info!(batch_id = %batch.id, size = batch.items.len(), ?trigger, "Processing batch of views");

        Ok(batch)
    }

    /// Fold the endpoint result back into state. Always lowers the processing flag.
    pub fn reconcile(
        state: &mut AggregatorState,
        telemetry: &mut TelemetryRecorder,
        batch: &InFlightBatch,
        result: Result<BatchAck, SubmitError>,
    ) -> FlushOutcome {
        let size = batch.items.len();
        let latency_ms = batch.started_at.elapsed().as_millis() as u64;

        let (outcome, kind) = match result {
            Ok(BatchAck {
                updated_counts: Some(counts),
            }) => {
                info!(batch_id = %batch.id, size, latency_ms, "Batch confirmed");
                state.reduce(StateDelta::BatchConfirmed {
                    batch: batch.items.clone(),
                    counts,
                });
                (
                    FlushOutcome::Confirmed {
                        batch_id: batch.id,
                        size,
                    },
                    SettleKind::Confirmed,
                )
            }
            Ok(BatchAck {
                updated_counts: None,
            }) => {
                warn!(
                    batch_id = %batch.id,
                    size,
                    "Batch acknowledged without updated counts; falling back to local increment"
                );
                state.reduce(StateDelta::BatchAcknowledged {
                    batch: batch.items.clone(),
                });
                (
                    FlushOutcome::Degraded {
                        batch_id: batch.id,
                        size,
                    },
                    SettleKind::Degraded,
                )
            }
            Err(error) => {
                warn!(
                    batch_id = %batch.id,
                    size,
                    %error,
                    "Failed to submit view batch; views stay pending for retry"
                );
                state.reduce(StateDelta::FlushFailed);
                (
                    FlushOutcome::Failed {
                        batch_id: batch.id,
                        size,
                        error: error.to_string(),
                    },
                    SettleKind::Failed,
                )
            }
        };

        telemetry.record(TelemetryEvent::BatchSettled {
            batch_id: batch.id,
            size,
            result: kind,
            latency_ms,
        });

        outcome
    }
}
