use async_trait::async_trait;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    submitter::{SubmissionReceipt, TransactionSubmitter},
    types::{L1Transaction, PendingRelayRequest},
    Error, Result,
};

const API_KEY_HEADER: &str = "X-Api-Key";
const API_SECRET_HEADER: &str = "X-Api-Secret";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayStatus {
    pub paused: bool,
    /// Account the relay signs with; it becomes the proof submitter.
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    pub transaction_id: String,
    #[serde(default)]
    pub hash: Option<TxHash>,
}

/// A third-party service that queues, signs and broadcasts transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionRelay: Send + Sync {
    async fn status(&self) -> Result<RelayStatus>;

    async fn pending_transactions(&self) -> Result<Vec<PendingRelayRequest>>;

    async fn submit(&self, tx: &L1Transaction) -> Result<RelayReceipt>;
}

/// Refuses to go on with a paused relay.
pub async fn ensure_not_paused(relay: &dyn TransactionRelay) -> Result<RelayStatus> {
    let status = relay.status().await?;
    if status.paused {
        return Err(Error::RelayPaused(status.address.to_string()));
    }
    Ok(status)
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    to: Address,
    data: &'a Bytes,
    value: U256,
    speed: &'static str,
}

/// JSON-over-HTTP relay client.
pub struct HttpRelay {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    api_secret: String,
}

impl HttpRelay {
    pub fn new(api_url: &str, api_key: &str, api_secret: &str) -> Result<Self> {
        reqwest::Url::parse(api_url).map_err(|e| Error::Config(format!("Invalid relay api_url: {}", e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_SECRET_HEADER, &self.api_secret)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Relay(format!("Relay responded {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Unexpected relay response: {}", e)))
    }
}

#[async_trait]
impl TransactionRelay for HttpRelay {
    async fn status(&self) -> Result<RelayStatus> {
        self.send(self.client.get(self.url("relayer"))).await
    }

    async fn pending_transactions(&self) -> Result<Vec<PendingRelayRequest>> {
        let request = self.client.get(self.url("txs")).query(&[("status", "pending")]);
        self.send(request).await
    }

    async fn submit(&self, tx: &L1Transaction) -> Result<RelayReceipt> {
        let body = SubmitRequest {
            to: tx.to,
            data: &tx.data,
            value: tx.value,
            speed: "fast",
        };
        self.send(self.client.post(self.url("txs")).json(&body)).await
    }
}

/// [`TransactionSubmitter`] backed by a [`TransactionRelay`]. The relay's own
/// pending queue is the de-duplication oracle.
pub struct RelaySubmitter {
    relay: Arc<dyn TransactionRelay>,
}

impl RelaySubmitter {
    pub fn new(relay: Arc<dyn TransactionRelay>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl TransactionSubmitter for RelaySubmitter {
    fn kind(&self) -> &'static str {
        "relay"
    }

    async fn pending(&self) -> Result<Vec<PendingRelayRequest>> {
        self.relay.pending_transactions().await
    }

    async fn submit(&self, tx: &L1Transaction) -> Result<SubmissionReceipt> {
        let receipt = self.relay.submit(tx).await?;
        match receipt.hash {
            Some(hash) => info!(transaction_id = %receipt.transaction_id, %hash, "Relay accepted transaction"),
            None => warn!(transaction_id = %receipt.transaction_id, "Relay accepted transaction without a hash yet"),
        }
        Ok(SubmissionReceipt::Relayed {
            transaction_id: receipt.transaction_id,
        })
    }
}
