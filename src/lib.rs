pub mod aggregator;
pub mod config;
pub mod error;
pub mod kernel;
pub mod services;

// Re-export the caller-facing surface
pub use aggregator::{Aggregator, FlushHandle};
pub use config::{AggregatorConfig, EndpointConfig};
pub use error::SubmitError;
pub use kernel::batch::{BatchAck, FlushOutcome, SkipReason};
pub use kernel::item::ItemId;
pub use services::views::{BatchEndpoint, HttpBatchClient};
