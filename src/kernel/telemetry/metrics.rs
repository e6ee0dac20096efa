use std::collections::VecDeque;

use super::event::{SettleKind, TelemetryEvent};
use crate::kernel::scheduler::Trigger;

#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub flush_stats: FlushStats,
    pub trigger_stats: TriggerStats,
}

#[derive(Debug, Clone, Default)]
pub struct FlushStats {
    pub submitted: u64,
    pub confirmed: u64,
    pub degraded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub items_submitted: u64,
    pub max_batch_size: usize,
    pub avg_batch_size: f64,
    pub total_latency_ms: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerStats {
    pub threshold: u64,
    pub delay: u64,
    pub manual: u64,
    pub teardown: u64,
    pub timers_armed: u64,
    pub timers_canceled: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();
    let mut settled = 0u64;

    for event in events {
        match event {
            TelemetryEvent::TriggerFired { trigger, .. } => match trigger {
                Trigger::Threshold => snap.trigger_stats.threshold += 1,
                Trigger::Delay => snap.trigger_stats.delay += 1,
                Trigger::Manual => snap.trigger_stats.manual += 1,
                Trigger::Teardown => snap.trigger_stats.teardown += 1,
            },
            TelemetryEvent::TimerArmed { .. } => snap.trigger_stats.timers_armed += 1,
            TelemetryEvent::TimerCanceled => snap.trigger_stats.timers_canceled += 1,
            TelemetryEvent::FlushSkipped { .. } => snap.flush_stats.skipped += 1,
            TelemetryEvent::BatchSubmitted { size, .. } => {
                snap.flush_stats.submitted += 1;
                snap.flush_stats.items_submitted += *size as u64;
                if *size > snap.flush_stats.max_batch_size {
                    snap.flush_stats.max_batch_size = *size;
                }
            }
            TelemetryEvent::BatchSettled { result, latency_ms, .. } => {
                match result {
                    SettleKind::Confirmed => snap.flush_stats.confirmed += 1,
                    SettleKind::Degraded => snap.flush_stats.degraded += 1,
                    SettleKind::Failed => snap.flush_stats.failed += 1,
                }
                snap.flush_stats.total_latency_ms += latency_ms;
                settled += 1;
            }
            TelemetryEvent::Teardown { .. } => {}
        }
    }

    if snap.flush_stats.submitted > 0 {
        snap.flush_stats.avg_batch_size =
            snap.flush_stats.items_submitted as f64 / snap.flush_stats.submitted as f64;
    }

    if settled > 0 {
        snap.flush_stats.avg_latency_ms = snap.flush_stats.total_latency_ms as f64 / settled as f64;
    }

    snap
}
