use async_trait::async_trait;
use alloy::{
    network::TransactionBuilder,
    primitives::{Address, TxHash},
    providers::{DynProvider, Provider},
    rpc::types::TransactionRequest,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    submitter::{SubmissionReceipt, TransactionSubmitter},
    types::{L1Transaction, PendingRelayRequest},
    Error, Result,
};

#[derive(Debug, Clone)]
struct InFlight {
    tx_hash: TxHash,
    request: PendingRelayRequest,
}

/// Signs with a local key and broadcasts to L1, then blocks until the
/// transaction has `confirmations` blocks on top of it.
///
/// Transactions whose confirmation wait failed stay in the in-flight list
/// until the node either mines or forgets them, so a later pass does not
/// send the same call again while the first one may still land.
pub struct DirectSubmitter {
    provider: DynProvider,
    address: Address,
    confirmations: u64,
    in_flight: Mutex<Vec<InFlight>>,
}

impl DirectSubmitter {
    /// `provider` must carry the wallet for `address`.
    pub fn new(provider: DynProvider, address: Address, confirmations: u64) -> Self {
        Self {
            provider,
            address,
            confirmations,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn still_pending(&self, tx_hash: TxHash) -> Result<bool> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| Error::Chain(format!("Failed to get receipt {}: {}", tx_hash, e)))?;
        if receipt.is_some() {
            debug!(%tx_hash, "In-flight transaction was mined");
            return Ok(false);
        }

        let known = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(|e| Error::Chain(format!("Failed to get transaction {}: {}", tx_hash, e)))?;
        if known.is_none() {
            warn!(%tx_hash, "In-flight transaction was dropped by the node");
            return Ok(false);
        }

        Ok(true)
    }
}

#[async_trait]
impl TransactionSubmitter for DirectSubmitter {
    fn kind(&self) -> &'static str {
        "direct"
    }

    async fn pending(&self) -> Result<Vec<PendingRelayRequest>> {
        let mut in_flight = self.in_flight.lock().await;

        // An entry is only dropped once the node has answered for it.
        let mut settled = Vec::new();
        for entry in in_flight.iter() {
            match self.still_pending(entry.tx_hash).await {
                Ok(true) => {}
                Ok(false) => settled.push(entry.tx_hash),
                Err(e) => warn!(tx_hash = %entry.tx_hash, "Keeping in-flight transaction, lookup failed: {}", e),
            }
        }
        in_flight.retain(|entry| !settled.contains(&entry.tx_hash));

        Ok(in_flight.iter().map(|entry| entry.request.clone()).collect())
    }

    async fn submit(&self, tx: &L1Transaction) -> Result<SubmissionReceipt> {
        let request = TransactionRequest::default()
            .with_from(self.address)
            .with_to(tx.to)
            .with_input(tx.data.clone())
            .with_value(tx.value);

        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| Error::Chain(format!("Failed to send transaction: {}", e)))?;
        let tx_hash = *pending.tx_hash();

        self.in_flight.lock().await.push(InFlight {
            tx_hash,
            request: PendingRelayRequest::from(tx),
        });

        info!(%tx_hash, "Waiting for {} blocks of confirmation...", self.confirmations);
        pending
            .with_required_confirmations(self.confirmations)
            .watch()
            .await
            .map_err(|e| Error::Chain(format!("Transaction {} was not confirmed: {}", tx_hash, e)))?;
        info!(%tx_hash, "Confirmations done");

        self.in_flight.lock().await.retain(|entry| entry.tx_hash != tx_hash);
        Ok(SubmissionReceipt::Broadcast { tx_hash })
    }
}
