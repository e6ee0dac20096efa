use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::endpoint::BatchEndpoint;
use crate::config::EndpointConfig;
use crate::error::SubmitError;
use crate::kernel::batch::BatchAck;
use crate::kernel::item::ItemId;

const SUCCESS_STATUS: &str = "success";

/// HTTP implementation of the batch-view endpoint (`POST {base}/posts/batch-view`).
#[derive(Clone)]
pub struct HttpBatchClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Serialize)]
struct BatchViewRequest<'a> {
    #[serde(rename = "postIds")]
    post_ids: &'a [ItemId],
}

#[derive(Deserialize)]
struct BatchViewResponse {
    status: String,
    // Free-form: only `updatedCounts` inside it is interpreted.
    #[serde(default)]
    data: Option<Value>,
}

impl HttpBatchClient {
    pub fn new(config: &EndpointConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|error| {
                warn!(%error, "Failed to build HTTP client; using defaults without the configured timeout");
                Client::default()
            });
        Self::with_client(client, config)
    }

    /// Reuse a caller-built transport. `config.timeout` is ignored here; the
    /// transport's own timeout policy applies.
    pub fn with_client(client: Client, config: &EndpointConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    pub fn batch_url(&self) -> String {
        format!("{}/posts/batch-view", self.base_url)
    }
}

#[async_trait]
impl BatchEndpoint for HttpBatchClient {
    async fn submit(&self, items: Vec<ItemId>) -> Result<BatchAck, SubmitError> {
        let body = BatchViewRequest { post_ids: &items };

        let mut request = self.client.post(self.batch_url()).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status(status));
        }

        let text = response.text().await?;
        debug!(size = items.len(), "Batch-view response received");
        parse_batch_response(&text)
    }
}

/// Decode a batch-view response body.
///
/// `{"status":"success","data":{"updatedCounts":{..}}}` yields counts when every
/// value is a non-negative integer. Any other success shape yields the degraded
/// ack: a success status outranks the optional detail. A non-success status is
/// `Rejected`; a body that is not JSON or has no string `status` is `Malformed`.
pub fn parse_batch_response(body: &str) -> Result<BatchAck, SubmitError> {
    let response: BatchViewResponse =
        serde_json::from_str(body).map_err(|e| SubmitError::Malformed(e.to_string()))?;

    if response.status != SUCCESS_STATUS {
        return Err(SubmitError::Rejected(response.status));
    }

    let updated_counts = response
        .data
        .as_ref()
        .and_then(|data| data.get("updatedCounts"))
        .and_then(decode_counts);

    if updated_counts.is_none() && response.data.is_some() {
        debug!("Success reply without usable updatedCounts");
    }

    Ok(BatchAck { updated_counts })
}

/// `None` unless the value is an object of non-negative integers. Empty keys are skipped.
fn decode_counts(raw: &Value) -> Option<HashMap<ItemId, u64>> {
    let mut counts = HashMap::new();
    for (id, count) in raw.as_object()? {
        let count = count.as_u64()?;
        if let Some(id) = ItemId::parse(id) {
            counts.insert(id, count);
        }
    }
    Some(counts)
}
