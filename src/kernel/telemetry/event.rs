use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::batch::SkipReason;
use crate::kernel::scheduler::Trigger;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TelemetryEvent {
    TriggerFired {
        trigger: Trigger,
        pending: usize,
    },

    TimerArmed {
        delay_ms: u64,
    },

    /// An armed timer was disarmed before it fired (threshold, manual or teardown flush).
    TimerCanceled,

    FlushSkipped {
        trigger: Trigger,
        reason: SkipReason,
    },

    BatchSubmitted {
        batch_id: Uuid,
        size: usize,
    },

    BatchSettled {
        batch_id: Uuid,
        size: usize,
        result: SettleKind,
        latency_ms: u64,
    },

    Teardown {
        pending: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettleKind {
    Confirmed,
    Degraded,
    Failed,
}
