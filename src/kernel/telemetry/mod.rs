//! Flush telemetry.
//!
//! Telemetry is a read-only side-effect layer: nothing in the scheduling or
//! reconciliation path reads it back. Events carry batch ids, sizes and
//! latencies only, never item ids.

pub mod event;
pub mod metrics;
pub mod recorder;
