use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message sent through the L2 cross-domain messenger, as observed in a
/// withdrawal transaction's receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainMessage {
    pub sender: Address,
    pub target: Address,
    pub message: Bytes,
    pub value: U256,
    pub min_gas_limit: U256,
    pub message_nonce: U256,
    pub block_number: u64,
    pub transaction_hash: TxHash,
    pub log_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessagePriority {
    Ignore,
    InformationalMessage,
    ValueMessage,
}

impl MessagePriority {
    pub fn label(&self) -> &'static str {
        match self {
            MessagePriority::Ignore => "ignored-message",
            MessagePriority::InformationalMessage => "root-message",
            MessagePriority::ValueMessage => "value-message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettlementStatus {
    /// Not provable yet, or proven and still inside the challenge window.
    Unready,
    ReadyToProve,
    ReadyToRelay,
    Settled,
}

/// An L1 transaction built for a prove or finalize step. Unsigned; the
/// submitter decides who signs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1Transaction {
    pub to: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
}

/// One entry of a submitter's pending queue. Only `to` and `data` take part in
/// de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRelayRequest {
    pub to: Option<Address>,
    #[serde(default)]
    pub data: Bytes,
}

impl PendingRelayRequest {
    pub fn matches(&self, tx: &L1Transaction) -> bool {
        self.to == Some(tx.to) && self.data == tx.data
    }
}

impl From<&L1Transaction> for PendingRelayRequest {
    fn from(tx: &L1Transaction) -> Self {
        Self {
            to: Some(tx.to),
            data: tx.data.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Prove,
    Finalize,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Prove => write!(f, "prove"),
            ActionKind::Finalize => write!(f, "finalize"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Submitted(ActionKind),
    AlreadyPending(ActionKind),
}

/// Inclusive block range queried by one scanner page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from_block: u64,
    pub to_block: u64,
}
