use async_trait::async_trait;

use crate::error::SubmitError;
use crate::kernel::batch::BatchAck;
use crate::kernel::item::ItemId;

/// The one external capability the aggregator depends on.
///
/// `items` is non-empty and holds distinct ids. Any `Err` is treated as retryable.
#[async_trait]
pub trait BatchEndpoint: Send + Sync + 'static {
    async fn submit(&self, items: Vec<ItemId>) -> Result<BatchAck, SubmitError>;
}

