pub mod batch;
pub mod counts;
pub mod item;
pub mod pending;
pub mod scheduler;
pub mod state;
pub mod telemetry;
