//! Outbound HTTP client used by the Master to dispatch blocks to miners,
//! with a bounded exponential-backoff retry budget.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;

use crate::error::CoreError;
use crate::models::{Block, ConsensusFromMasterPayload, ConsensusToMasterPayload};

#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    retry_budget: usize,
}

impl PeerClient {
    pub fn new(retry_budget: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client configuration is static and valid");
        PeerClient { http, retry_budget }
    }

    pub async fn dispatch_block(
        &self,
        source_address: &str,
        source_port: u16,
        block: &Block,
        master_address: &str,
        consensus_negotiation_id: &str,
    ) -> Result<(), CoreError> {
        let payload = ConsensusFromMasterPayload {
            block: block.clone(),
            master_address: master_address.to_string(),
            consensus_negotiation_id: consensus_negotiation_id.to_string(),
        };
        let url = format!("http://{source_address}:{source_port}/node/blockchain/receive_raw_block");

        self.post_with_retry(&url, &payload).await
    }

    /// Reports a mined block back to the Master that dispatched it.
    pub async fn report_hashed_block(
        &self,
        master_address: &str,
        payload: &ConsensusToMasterPayload,
    ) -> Result<(), CoreError> {
        let url = format!("http://{master_address}/node/blockchain/receive_hashed_block");
        self.post_with_retry(&url, payload).await
    }

    async fn post_with_retry<T: Serialize>(&self, url: &str, body: &T) -> Result<(), CoreError> {
        let backoff = ExponentialBuilder::default().with_max_times(self.retry_budget);
        let http = self.http.clone();
        let url = url.to_string();
        let body = serde_json::to_value(body)?;

        (|| {
            let http = http.clone();
            let url = url.clone();
            let body = body.clone();
            async move {
                let response = http.post(&url).json(&body).send().await?;
                match response.error_for_status() {
                    Ok(_) => Ok(()),
                    Err(e) => Err(e),
                }
            }
        })
        .retry(backoff)
        .await
        .map_err(|e| CoreError::Transient(format!("peer request to {url} failed: {e}")))
    }
}
