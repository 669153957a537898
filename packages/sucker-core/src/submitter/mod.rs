use async_trait::async_trait;
use crate::{
    types::{L1Transaction, PendingRelayRequest},
    Result,
};

/// What a submitter hands back after accepting a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionReceipt {
    /// Broadcast and confirmed by the local signer.
    Broadcast { tx_hash: alloy::primitives::TxHash },
    /// Queued by the relay service; it signs and broadcasts later.
    Relayed { transaction_id: String },
}

/// Sends prove and finalize transactions to L1, either directly or through a
/// relay service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Short name for logs.
    fn kind(&self) -> &'static str;

    /// Snapshot of requests accepted but not yet mined. Used to avoid sending
    /// the same request twice.
    async fn pending(&self) -> Result<Vec<PendingRelayRequest>>;

    async fn submit(&self, tx: &L1Transaction) -> Result<SubmissionReceipt>;
}

pub mod direct;
pub mod relay;

pub use direct::DirectSubmitter;
pub use relay::{HttpRelay, RelaySubmitter, RelayStatus, TransactionRelay};
