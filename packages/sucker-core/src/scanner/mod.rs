use async_trait::async_trait;
use alloy::{
    primitives::{keccak256, Address, TxHash, B256},
    providers::{DynProvider, Provider},
    rpc::types::Filter,
};
use std::sync::Arc;
use tracing::debug;

use crate::{config::ScanConfig, types::ScanWindow, Error, Result};

/// Emitted by the L2 sucker for every batch sent to the remote chain.
pub const WITHDRAWAL_EVENT: &str = "SuckingToRemote(address,uint64)";

pub fn withdrawal_topic() -> B256 {
    keccak256(WITHDRAWAL_EVENT)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub topic0: B256,
    pub window: ScanWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntry {
    /// `None` for logs of pending blocks.
    pub transaction_hash: Option<TxHash>,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainLogSource: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    /// Logs matching `query`, in block order.
    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>>;
}

#[async_trait]
impl ChainLogSource for DynProvider {
    async fn block_number(&self) -> Result<u64> {
        self.get_block_number()
            .await
            .map_err(|e| Error::Chain(format!("Failed to get block number: {}", e)))
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let filter = Filter::new()
            .address(query.address)
            .event_signature(query.topic0)
            .from_block(query.window.from_block)
            .to_block(query.window.to_block);

        let logs = self.get_logs(&filter).await.map_err(|e| {
            Error::Chain(format!(
                "Failed to get logs in blocks {} - {}: {}",
                query.window.from_block, query.window.to_block, e
            ))
        })?;

        Ok(logs
            .into_iter()
            .map(|log| LogEntry {
                transaction_hash: log.transaction_hash,
                block_number: log.block_number,
                log_index: log.log_index,
            })
            .collect())
    }
}

/// Collapses runs of log entries from the same transaction into one hash.
///
/// Only the immediately previous hash is compared, so a transaction whose logs
/// are interleaved with another's is emitted again. `last` carries the previous
/// hash across pages and the updated value is returned with the hashes.
pub fn coalesce(logs: &[LogEntry], mut last: Option<TxHash>) -> (Vec<TxHash>, Option<TxHash>) {
    let mut hashes = Vec::new();
    for tx_hash in logs.iter().filter_map(|log| log.transaction_hash) {
        if last == Some(tx_hash) {
            continue;
        }
        last = Some(tx_hash);
        hashes.push(tx_hash);
    }
    (hashes, last)
}

/// Walks the sucker's withdrawal logs backwards from the chain head.
pub struct EventScanner {
    source: Arc<dyn ChainLogSource>,
    bridge: Address,
    topic0: B256,
    lookback_blocks: u64,
    page_size: u64,
}

impl EventScanner {
    pub fn new(source: Arc<dyn ChainLogSource>, bridge: Address, config: &ScanConfig) -> Self {
        Self {
            source,
            bridge,
            topic0: withdrawal_topic(),
            lookback_blocks: config.lookback_blocks,
            page_size: config.page_size.max(1),
        }
    }

    /// Starts a scan at the current head. The returned cursor yields one page
    /// of transaction hashes at a time; nothing is shared between scans.
    pub async fn scan(&self) -> Result<LogScan<'_>> {
        let head = self.source.block_number().await?;
        let oldest = head.saturating_sub(self.lookback_blocks);
        debug!(head, oldest, "Starting withdrawal scan");

        Ok(LogScan {
            scanner: self,
            upper: Some(head),
            oldest,
            last_tx: None,
        })
    }

    /// Every hash of a full scan, newest page first.
    pub async fn scan_all(&self) -> Result<Vec<TxHash>> {
        let mut scan = self.scan().await?;
        let mut hashes = Vec::new();
        while let Some(page) = scan.next_page().await? {
            hashes.extend(page);
        }
        Ok(hashes)
    }
}

pub struct LogScan<'a> {
    scanner: &'a EventScanner,
    /// Upper bound of the next window; `None` once it would drop below block 0.
    upper: Option<u64>,
    oldest: u64,
    last_tx: Option<TxHash>,
}

impl LogScan<'_> {
    pub fn oldest(&self) -> u64 {
        self.oldest
    }

    fn next_window(&mut self) -> Option<ScanWindow> {
        let upper = self.upper.filter(|upper| *upper >= self.oldest)?;
        let page_size = self.scanner.page_size;
        self.upper = upper.checked_sub(page_size);

        Some(ScanWindow {
            from_block: upper.saturating_sub(page_size).max(self.oldest),
            to_block: upper,
        })
    }

    /// Hashes found in the next window, or `None` when the lookback is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<TxHash>>> {
        let Some(window) = self.next_window() else {
            return Ok(None);
        };
        debug!("Looking in blocks {} - {}", window.from_block, window.to_block);

        let query = LogQuery {
            address: self.scanner.bridge,
            topic0: self.scanner.topic0,
            window,
        };
        let logs = self.scanner.source.logs(&query).await?;

        let (hashes, last_tx) = coalesce(&logs, self.last_tx);
        self.last_tx = last_tx;
        Ok(Some(hashes))
    }
}
