pub mod client;
pub mod endpoint;

pub use client::{parse_batch_response, HttpBatchClient};
pub use endpoint::BatchEndpoint;
