use alloy::primitives::{Address, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    classify::classify_with,
    config::{BridgeAddresses, Config, SubmitterConfig},
    executor::ActionExecutor,
    messenger::{ChainMessenger, OpStackMessenger, StatusResolver},
    provider,
    scanner::EventScanner,
    submitter::{
        relay::ensure_not_paused, DirectSubmitter, HttpRelay, RelaySubmitter, TransactionSubmitter,
    },
    types::{CrossChainMessage, MessagePriority, Outcome},
    Error, Result,
};

/// Counters for one scan-and-settle pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub transactions: usize,
    pub messages: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub submitted: usize,
    pub already_pending: usize,
    pub failed: usize,
}

pub struct Relayer {
    scanner: EventScanner,
    messenger: Arc<dyn ChainMessenger>,
    resolver: StatusResolver,
    executor: ActionExecutor,
    bridge: BridgeAddresses,
    poll_interval: Duration,
}

impl Relayer {
    pub fn new(
        scanner: EventScanner,
        messenger: Arc<dyn ChainMessenger>,
        submitter: Arc<dyn TransactionSubmitter>,
        bridge: BridgeAddresses,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scanner,
            resolver: StatusResolver::new(messenger.clone()),
            executor: ActionExecutor::new(messenger.clone(), submitter),
            messenger,
            bridge,
            poll_interval,
        }
    }

    /// Connects to both chains and the configured submitter. A paused relay
    /// is a startup error.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let bridge = config.bridge.addresses()?;

        let l1 = provider::connect(&config.l1)?;
        provider::ensure_chain_id(&l1, &config.l1).await?;
        let l2 = provider::connect(&config.l2)?;
        provider::ensure_chain_id(&l2, &config.l2).await?;

        let (submitter, proof_submitter): (Arc<dyn TransactionSubmitter>, Address) = match &config.submitter {
            SubmitterConfig::Direct { private_key } => {
                let key = private_key
                    .as_deref()
                    .ok_or_else(|| Error::Config("Direct mode needs a private key".to_string()))?;
                let signer = provider::parse_signer(key)?;
                let address = signer.address();
                let wallet = provider::connect_with_signer(&config.l1, signer)?;
                info!(%address, "Submitting directly");
                (
                    Arc::new(DirectSubmitter::new(wallet, address, config.relayer.confirmations)),
                    address,
                )
            }
            SubmitterConfig::Relay { api_url, api_key, api_secret } => {
                let relay = Arc::new(HttpRelay::new(
                    api_url,
                    api_key.as_deref().unwrap_or_default(),
                    api_secret.as_deref().unwrap_or_default(),
                )?);
                let status = ensure_not_paused(relay.as_ref()).await?;
                info!(address = %status.address, "Submitting through relay {}", api_url);
                (Arc::new(RelaySubmitter::new(relay)), status.address)
            }
        };

        let messenger: Arc<dyn ChainMessenger> =
            Arc::new(OpStackMessenger::new(l1, l2.clone(), &config.op_stack, proof_submitter));
        // The L2 sucker emits the withdrawal events.
        let scanner = EventScanner::new(Arc::new(l2), bridge.remote_sucker, &config.scan);

        Ok(Self::new(
            scanner,
            messenger,
            submitter,
            bridge,
            Duration::from_secs(config.relayer.poll_interval),
        ))
    }

    /// Runs passes until `cancel` fires. A failed pass is logged and the next
    /// one starts after the usual interval.
    pub async fn start(&self, cancel: CancellationToken) {
        info!("Starting relayer...");

        loop {
            match self.run_once(&cancel).await {
                Ok(summary) => info!(?summary, "Pass finished"),
                Err(e) => error!("Pass failed: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Received shutdown signal. Stopping relayer.");
                    return;
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    /// One scan over the lookback window, settling every message found.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        let mut scan = self.scanner.scan().await?;

        while let Some(page) = scan.next_page().await? {
            for tx_hash in page {
                if cancel.is_cancelled() {
                    info!("Pass interrupted by shutdown");
                    return Ok(summary);
                }
                summary.transactions += 1;
                self.process_transaction(tx_hash, &mut summary).await;
            }
        }

        Ok(summary)
    }

    async fn process_transaction(&self, tx_hash: TxHash, summary: &mut PassSummary) {
        let messages = match self.messenger.messages_by_transaction(tx_hash).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(%tx_hash, "Failed to load messages, skipping transaction: {}", e);
                summary.failed += 1;
                return;
            }
        };
        debug!(%tx_hash, "found {} messages", messages.len());

        self.process_messages(&messages, summary).await;
    }

    /// Settles `messages` in order. A failure on one message is logged and the
    /// rest still run.
    pub async fn process_messages(&self, messages: &[CrossChainMessage], summary: &mut PassSummary) {
        for (index, message) in messages.iter().enumerate() {
            summary.messages += 1;
            match self.process_message(message, index).await {
                Ok(None) => summary.ignored += 1,
                Ok(Some(Outcome::Skipped)) => summary.skipped += 1,
                Ok(Some(Outcome::Submitted(kind))) => {
                    info!(tx_hash = %message.transaction_hash, index, %kind, "Submitted");
                    summary.submitted += 1;
                }
                Ok(Some(Outcome::AlreadyPending(_))) => summary.already_pending += 1,
                Err(e) => {
                    error!(
                        tx_hash = %message.transaction_hash,
                        index,
                        "Skipping this message because of an error: {}", e
                    );
                    summary.failed += 1;
                }
            }
        }
    }

    /// `None` when the message does not concern this sucker pair.
    async fn process_message(&self, message: &CrossChainMessage, index: usize) -> Result<Option<Outcome>> {
        let priority = classify_with(message, &self.bridge);
        if priority == MessagePriority::Ignore {
            return Ok(None);
        }

        let status = self.resolver.resolve(message, index).await?;
        debug!(tx_hash = %message.transaction_hash, index, ?status, "{}", priority.label());

        self.executor.act(message, index, priority, status).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ScanConfig,
        messenger::MockChainMessenger,
        scanner::{LogEntry, MockChainLogSource},
        submitter::{MockTransactionSubmitter, SubmissionReceipt},
        types::{L1Transaction, PendingRelayRequest, SettlementStatus},
    };
    use alloy::primitives::{address, Bytes, B256, U256};
    use std::sync::Mutex;

    const LOCAL: Address = address!("0x00000000000000000000000000000000000000a1");
    const REMOTE: Address = address!("0x00000000000000000000000000000000000000a2");
    const STANDARD: Address = address!("0x00000000000000000000000000000000000000a3");
    const PORTAL: Address = address!("0x000000000000000000000000000000000000000f");

    fn bridge() -> BridgeAddresses {
        BridgeAddresses {
            local_sucker: LOCAL,
            remote_sucker: REMOTE,
            standard_bridge: STANDARD,
        }
    }

    fn message(tx: u8, sender: Address, target: Address, value: u64) -> CrossChainMessage {
        CrossChainMessage {
            sender,
            target,
            message: Bytes::new(),
            value: U256::from(value),
            min_gas_limit: U256::from(200_000u64),
            message_nonce: U256::from(tx),
            block_number: 900,
            transaction_hash: B256::repeat_byte(tx),
            log_index: 0,
        }
    }

    fn build_tx(kind: u8, message: &CrossChainMessage, index: usize) -> L1Transaction {
        let mut data = vec![kind, index as u8];
        data.extend_from_slice(message.transaction_hash.as_slice());
        L1Transaction {
            to: PORTAL,
            data: Bytes::from(data),
            value: U256::ZERO,
        }
    }

    /// Log source whose every page contains one log per hash in `txs`.
    fn log_source(txs: Vec<u8>) -> MockChainLogSource {
        let mut source = MockChainLogSource::new();
        source.expect_block_number().returning(|| Ok(1_000));
        source.expect_logs().returning(move |_| {
            Ok(txs
                .iter()
                .map(|tx| LogEntry {
                    transaction_hash: Some(B256::repeat_byte(*tx)),
                    ..Default::default()
                })
                .collect())
        });
        source
    }

    fn relayer(
        source: MockChainLogSource,
        messenger: MockChainMessenger,
        submitter: MockTransactionSubmitter,
    ) -> Relayer {
        // A single page per pass.
        let scan = ScanConfig {
            lookback_blocks: 50,
            page_size: 100,
        };
        Relayer::new(
            EventScanner::new(Arc::new(source), REMOTE, &scan),
            Arc::new(messenger),
            Arc::new(submitter),
            bridge(),
            Duration::from_secs(300),
        )
    }

    fn recording_submitter(
        pending: Arc<Mutex<Vec<PendingRelayRequest>>>,
        sent: Arc<Mutex<Vec<L1Transaction>>>,
    ) -> MockTransactionSubmitter {
        let mut submitter = MockTransactionSubmitter::new();
        submitter.expect_kind().return_const("relay");
        submitter
            .expect_pending()
            .returning(move || Ok(pending.lock().unwrap().clone()));
        submitter.expect_submit().returning(move |tx| {
            sent.lock().unwrap().push(tx.clone());
            Ok(SubmissionReceipt::Relayed {
                transaction_id: format!("tx-{}", sent.lock().unwrap().len()),
            })
        });
        submitter
    }

    #[tokio::test]
    async fn test_prove_then_finalize_then_already_pending() {
        let status = Arc::new(Mutex::new(SettlementStatus::ReadyToProve));
        let pending = Arc::new(Mutex::new(Vec::new()));
        let sent = Arc::new(Mutex::new(Vec::new()));

        let mut messenger = MockChainMessenger::new();
        messenger
            .expect_messages_by_transaction()
            .returning(|_| Ok(vec![message(1, REMOTE, LOCAL, 5)]));
        let current = status.clone();
        messenger
            .expect_message_status()
            .returning(move |_, _| Ok(*current.lock().unwrap()));
        messenger
            .expect_build_prove_transaction()
            .returning(|m, i| Ok(build_tx(1, m, i)));
        messenger
            .expect_build_finalize_transaction()
            .returning(|m, i| Ok(build_tx(2, m, i)));

        let relayer = relayer(
            log_source(vec![1]),
            messenger,
            recording_submitter(pending.clone(), sent.clone()),
        );
        let cancel = CancellationToken::new();
        let expected = message(1, REMOTE, LOCAL, 5);

        // Pass 1: provable, nothing queued.
        let summary = relayer.run_once(&cancel).await.unwrap();
        assert_eq!(summary.submitted, 1);
        assert_eq!(*sent.lock().unwrap(), vec![build_tx(1, &expected, 0)]);

        // Pass 2: the challenge window has passed.
        *status.lock().unwrap() = SettlementStatus::ReadyToRelay;
        let summary = relayer.run_once(&cancel).await.unwrap();
        assert_eq!(summary.submitted, 1);
        assert_eq!(sent.lock().unwrap().last(), Some(&build_tx(2, &expected, 0)));

        // Pass 3: the finalize call is still queued at the relay.
        pending
            .lock()
            .unwrap()
            .push(PendingRelayRequest::from(&build_tx(2, &expected, 0)));
        let summary = relayer.run_once(&cancel).await.unwrap();
        assert_eq!(summary.already_pending, 1);
        assert_eq!(summary.submitted, 0);
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_message_does_not_stop_siblings() {
        let mut messenger = MockChainMessenger::new();
        messenger.expect_messages_by_transaction().returning(|_| {
            Ok(vec![
                message(1, REMOTE, LOCAL, 0),
                message(1, REMOTE, LOCAL, 1),
                message(1, REMOTE, LOCAL, 2),
            ])
        });
        messenger.expect_message_status().returning(|_, index| {
            if index == 1 {
                Err(Error::Chain("execution reverted".to_string()))
            } else {
                Ok(SettlementStatus::ReadyToProve)
            }
        });
        messenger
            .expect_build_prove_transaction()
            .returning(|m, i| Ok(build_tx(1, m, i)));

        let sent = Arc::new(Mutex::new(Vec::new()));
        let relayer = relayer(
            log_source(vec![1]),
            messenger,
            recording_submitter(Arc::new(Mutex::new(Vec::new())), sent.clone()),
        );

        let summary = relayer.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.messages, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.submitted, 2);

        let indexes: Vec<u8> = sent.lock().unwrap().iter().map(|tx| tx.data[1]).collect();
        assert_eq!(indexes, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_failed_transaction_does_not_stop_the_pass() {
        let mut messenger = MockChainMessenger::new();
        messenger.expect_messages_by_transaction().returning(|tx_hash| {
            if tx_hash == B256::repeat_byte(1) {
                Err(Error::Chain("receipt not found".to_string()))
            } else {
                Ok(vec![message(2, REMOTE, LOCAL, 0)])
            }
        });
        messenger
            .expect_message_status()
            .returning(|_, _| Ok(SettlementStatus::Settled));

        let relayer = relayer(log_source(vec![1, 2]), messenger, MockTransactionSubmitter::new());

        let summary = relayer.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_ignored_messages_are_never_resolved() {
        let mut messenger = MockChainMessenger::new();
        messenger
            .expect_messages_by_transaction()
            .returning(|_| Ok(vec![message(1, Address::repeat_byte(0x99), LOCAL, 5)]));
        messenger.expect_message_status().never();

        let relayer = relayer(log_source(vec![1]), messenger, MockTransactionSubmitter::new());

        let summary = relayer.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.submitted + summary.skipped + summary.failed, 0);
    }

    #[tokio::test]
    async fn test_cancelled_pass_stops_before_next_transaction() {
        let mut messenger = MockChainMessenger::new();
        messenger.expect_messages_by_transaction().never();

        let relayer = relayer(log_source(vec![1, 2]), messenger, MockTransactionSubmitter::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = relayer.run_once(&cancel).await.unwrap();
        assert_eq!(summary, PassSummary::default());
    }

    #[tokio::test]
    async fn test_start_survives_failed_pass_and_stops_on_cancel() {
        let mut source = MockChainLogSource::new();
        source
            .expect_block_number()
            .times(1)
            .returning(|| Err(Error::Network("connection refused".to_string())));

        let relayer = relayer(source, MockChainMessenger::new(), MockTransactionSubmitter::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), relayer.start(cancel))
            .await
            .expect("relayer did not stop after cancellation");
    }
}
