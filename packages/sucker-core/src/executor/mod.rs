use std::sync::Arc;
use tracing::info;

use crate::{
    messenger::ChainMessenger,
    submitter::TransactionSubmitter,
    types::{ActionKind, CrossChainMessage, MessagePriority, Outcome, SettlementStatus},
    Result,
};

/// Turns a classified message into at most one L1 transaction.
pub struct ActionExecutor {
    messenger: Arc<dyn ChainMessenger>,
    submitter: Arc<dyn TransactionSubmitter>,
}

impl ActionExecutor {
    pub fn new(messenger: Arc<dyn ChainMessenger>, submitter: Arc<dyn TransactionSubmitter>) -> Self {
        Self { messenger, submitter }
    }

    /// The step a message needs next, if any. Ignored messages never get one.
    pub fn plan(priority: MessagePriority, status: SettlementStatus) -> Option<ActionKind> {
        if priority == MessagePriority::Ignore {
            return None;
        }
        match status {
            SettlementStatus::ReadyToProve => Some(ActionKind::Prove),
            SettlementStatus::ReadyToRelay => Some(ActionKind::Finalize),
            SettlementStatus::Unready | SettlementStatus::Settled => None,
        }
    }

    /// Builds and submits the transaction for the message's next step.
    ///
    /// The submitter's pending queue is read right before sending; an entry
    /// with the same destination and calldata means the step is already on
    /// its way and nothing is sent. Pending entries are never replaced or
    /// re-priced.
    pub async fn act(
        &self,
        message: &CrossChainMessage,
        index: usize,
        priority: MessagePriority,
        status: SettlementStatus,
    ) -> Result<Outcome> {
        let Some(kind) = Self::plan(priority, status) else {
            return Ok(Outcome::Skipped);
        };

        let tx = match kind {
            ActionKind::Prove => {
                info!("Proving {} from {}", priority.label(), message.block_number);
                self.messenger.build_prove_transaction(message, index).await?
            }
            ActionKind::Finalize => {
                info!("Finalizing {} from {}", priority.label(), message.block_number);
                self.messenger.build_finalize_transaction(message, index).await?
            }
        };

        let pending = self.submitter.pending().await?;
        if pending.iter().any(|request| request.matches(&tx)) {
            info!(
                tx_hash = %message.transaction_hash,
                index,
                %kind,
                "Transaction already pending in {} queue, not resending",
                self.submitter.kind()
            );
            return Ok(Outcome::AlreadyPending(kind));
        }

        self.submitter.submit(&tx).await?;
        Ok(Outcome::Submitted(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messenger::MockChainMessenger,
        submitter::{MockTransactionSubmitter, SubmissionReceipt},
        types::{L1Transaction, PendingRelayRequest},
        Error,
    };
    use alloy::primitives::{Address, Bytes, B256, U256};

    const ALL_STATUSES: [SettlementStatus; 4] = [
        SettlementStatus::Unready,
        SettlementStatus::ReadyToProve,
        SettlementStatus::ReadyToRelay,
        SettlementStatus::Settled,
    ];

    fn message() -> CrossChainMessage {
        CrossChainMessage {
            sender: Address::repeat_byte(0xb2),
            target: Address::repeat_byte(0xb1),
            message: Bytes::new(),
            value: U256::from(5u64),
            min_gas_limit: U256::from(200_000u64),
            message_nonce: U256::from(3u64),
            block_number: 77,
            transaction_hash: B256::repeat_byte(0x77),
            log_index: 0,
        }
    }

    fn prove_tx() -> L1Transaction {
        L1Transaction {
            to: Address::repeat_byte(0x0f),
            data: Bytes::from(vec![1, 1, 1]),
            value: U256::ZERO,
        }
    }

    fn finalize_tx() -> L1Transaction {
        L1Transaction {
            to: Address::repeat_byte(0x0f),
            data: Bytes::from(vec![2, 2, 2]),
            value: U256::ZERO,
        }
    }

    fn messenger() -> MockChainMessenger {
        let mut messenger = MockChainMessenger::new();
        messenger.expect_build_prove_transaction().returning(|_, _| Ok(prove_tx()));
        messenger.expect_build_finalize_transaction().returning(|_, _| Ok(finalize_tx()));
        messenger
    }

    fn submitter(pending: Vec<PendingRelayRequest>, submissions: usize) -> MockTransactionSubmitter {
        let mut submitter = MockTransactionSubmitter::new();
        submitter.expect_kind().return_const("relay");
        submitter.expect_pending().returning(move || Ok(pending.clone()));
        submitter.expect_submit().times(submissions).returning(|_| {
            Ok(SubmissionReceipt::Relayed {
                transaction_id: "id".to_string(),
            })
        });
        submitter
    }

    #[test]
    fn test_decision_table() {
        for status in ALL_STATUSES {
            assert_eq!(ActionExecutor::plan(MessagePriority::Ignore, status), None);
        }
        for priority in [MessagePriority::ValueMessage, MessagePriority::InformationalMessage] {
            assert_eq!(ActionExecutor::plan(priority, SettlementStatus::Unready), None);
            assert_eq!(ActionExecutor::plan(priority, SettlementStatus::Settled), None);
            assert_eq!(ActionExecutor::plan(priority, SettlementStatus::ReadyToProve), Some(ActionKind::Prove));
            assert_eq!(ActionExecutor::plan(priority, SettlementStatus::ReadyToRelay), Some(ActionKind::Finalize));
        }
    }

    #[tokio::test]
    async fn test_ignored_message_touches_nothing() {
        // No expectations: any call on either mock panics.
        let executor = ActionExecutor::new(
            Arc::new(MockChainMessenger::new()),
            Arc::new(MockTransactionSubmitter::new()),
        );
        for status in ALL_STATUSES {
            let outcome = executor.act(&message(), 0, MessagePriority::Ignore, status).await.unwrap();
            assert_eq!(outcome, Outcome::Skipped);
        }
    }

    #[tokio::test]
    async fn test_prove_is_submitted_when_queue_is_empty() {
        let mut submitter = MockTransactionSubmitter::new();
        submitter.expect_kind().return_const("relay");
        submitter.expect_pending().returning(|| Ok(vec![]));
        submitter
            .expect_submit()
            .withf(|tx| *tx == prove_tx())
            .times(1)
            .returning(|_| Ok(SubmissionReceipt::Relayed { transaction_id: "p".to_string() }));

        let executor = ActionExecutor::new(Arc::new(messenger()), Arc::new(submitter));
        let outcome = executor
            .act(&message(), 0, MessagePriority::ValueMessage, SettlementStatus::ReadyToProve)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Submitted(ActionKind::Prove));
    }

    #[tokio::test]
    async fn test_matching_pending_entry_blocks_resubmission() {
        let pending = vec![PendingRelayRequest::from(&finalize_tx())];
        let executor = ActionExecutor::new(Arc::new(messenger()), Arc::new(submitter(pending, 0)));

        let outcome = executor
            .act(&message(), 0, MessagePriority::InformationalMessage, SettlementStatus::ReadyToRelay)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::AlreadyPending(ActionKind::Finalize));
    }

    #[tokio::test]
    async fn test_pending_entry_must_match_destination_and_data() {
        let pending = vec![
            // Same destination, other calldata.
            PendingRelayRequest::from(&prove_tx()),
            // Same calldata, other destination.
            PendingRelayRequest {
                to: Some(Address::repeat_byte(0xee)),
                data: finalize_tx().data,
            },
        ];
        let executor = ActionExecutor::new(Arc::new(messenger()), Arc::new(submitter(pending, 1)));

        let outcome = executor
            .act(&message(), 0, MessagePriority::ValueMessage, SettlementStatus::ReadyToRelay)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Submitted(ActionKind::Finalize));
    }

    #[tokio::test]
    async fn test_unready_and_settled_are_skipped() {
        let executor = ActionExecutor::new(
            Arc::new(MockChainMessenger::new()),
            Arc::new(MockTransactionSubmitter::new()),
        );
        for status in [SettlementStatus::Unready, SettlementStatus::Settled] {
            let outcome = executor.act(&message(), 0, MessagePriority::ValueMessage, status).await.unwrap();
            assert_eq!(outcome, Outcome::Skipped);
        }
    }

    #[tokio::test]
    async fn test_build_failure_sends_nothing() {
        let mut messenger = MockChainMessenger::new();
        messenger
            .expect_build_prove_transaction()
            .returning(|_, _| Err(Error::Chain("no dispute game covers block".to_string())));

        let executor = ActionExecutor::new(Arc::new(messenger), Arc::new(MockTransactionSubmitter::new()));
        let result = executor
            .act(&message(), 0, MessagePriority::ValueMessage, SettlementStatus::ReadyToProve)
            .await;
        assert!(matches!(result, Err(Error::Chain(_))));
    }
}
