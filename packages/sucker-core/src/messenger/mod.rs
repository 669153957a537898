use async_trait::async_trait;
use alloy::primitives::TxHash;
use std::sync::Arc;
use crate::{
    types::{CrossChainMessage, L1Transaction, SettlementStatus},
    Result,
};

/// The two-phase withdrawal protocol between the source chain (L2) and the
/// settlement chain (L1).
///
/// `index` is the position of the message in the list returned by
/// [`ChainMessenger::messages_by_transaction`] for its transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainMessenger: Send + Sync {
    /// Every cross-chain message sent by a source-chain transaction, in log order.
    async fn messages_by_transaction(&self, tx_hash: TxHash) -> Result<Vec<CrossChainMessage>>;

    /// Current settlement status, derived from L1 and L2 state.
    async fn message_status(&self, message: &CrossChainMessage, index: usize) -> Result<SettlementStatus>;

    async fn build_prove_transaction(&self, message: &CrossChainMessage, index: usize) -> Result<L1Transaction>;

    async fn build_finalize_transaction(&self, message: &CrossChainMessage, index: usize) -> Result<L1Transaction>;
}

/// Reads settlement status straight from the messenger. Nothing is cached:
/// the challenge window clock and L1 state move between calls.
#[derive(Clone)]
pub struct StatusResolver {
    messenger: Arc<dyn ChainMessenger>,
}

impl StatusResolver {
    pub fn new(messenger: Arc<dyn ChainMessenger>) -> Self {
        Self { messenger }
    }

    pub async fn resolve(&self, message: &CrossChainMessage, index: usize) -> Result<SettlementStatus> {
        self.messenger.message_status(message, index).await
    }
}

pub mod op_stack;

pub use op_stack::OpStackMessenger;
