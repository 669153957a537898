use async_trait::async_trait;
use alloy::{
    primitives::{keccak256, Address, TxHash, B256, U256},
    providers::{DynProvider, Provider},
    rpc::types::{Log, TransactionReceipt},
    sol,
    sol_types::{SolCall, SolEvent, SolValue},
};
use tracing::{debug, warn};

use crate::{
    config::OpStackConfig,
    messenger::ChainMessenger,
    types::{CrossChainMessage, L1Transaction, SettlementStatus},
    Error, Result,
};

/// How many of the most recent dispute games are searched for one that covers
/// a withdrawal's L2 block.
const GAME_SEARCH_DEPTH: u64 = 16;

/// `GameStatus.CHALLENGER_WINS`: the game's output root was proven wrong.
const CHALLENGER_WINS: u8 = 1;

sol! {
    /// Withdrawal as stored by the L2ToL1MessagePasser and consumed by the portal.
    #[derive(Debug, PartialEq, Eq)]
    struct WithdrawalTransaction {
        uint256 nonce;
        address sender;
        address target;
        uint256 value;
        uint256 gasLimit;
        bytes data;
    }

    #[derive(Debug)]
    struct OutputRootProof {
        bytes32 version;
        bytes32 stateRoot;
        bytes32 messagePasserStorageRoot;
        bytes32 latestBlockhash;
    }

    interface IL2CrossDomainMessenger {
        event SentMessage(address indexed target, address sender, bytes message, uint256 messageNonce, uint256 gasLimit);
        event SentMessageExtension1(address indexed sender, uint256 value);
    }

    interface IL2ToL1MessagePasser {
        event MessagePassed(
            uint256 indexed nonce,
            address indexed sender,
            address indexed target,
            uint256 value,
            uint256 gasLimit,
            bytes data,
            bytes32 withdrawalHash
        );
    }

    #[sol(rpc)]
    interface IOptimismPortal2 {
        function disputeGameFactory() external view returns (address);
        function respectedGameType() external view returns (uint32);
        function respectedGameTypeUpdatedAt() external view returns (uint64);
        function disputeGameBlacklist(address disputeGame) external view returns (bool);
        function finalizedWithdrawals(bytes32 withdrawalHash) external view returns (bool);
        function provenWithdrawals(bytes32 withdrawalHash, address proofSubmitter)
            external view returns (address disputeGameProxy, uint64 timestamp);
        function checkWithdrawal(bytes32 withdrawalHash, address proofSubmitter) external view;
        function proveWithdrawalTransaction(
            WithdrawalTransaction _tx,
            uint256 _disputeGameIndex,
            OutputRootProof _outputRootProof,
            bytes[] _withdrawalProof
        ) external;
        function finalizeWithdrawalTransactionExternalProof(
            WithdrawalTransaction _tx,
            address _proofSubmitter
        ) external;
    }

    #[sol(rpc)]
    interface IDisputeGame {
        function createdAt() external view returns (uint64);
        function status() external view returns (uint8);
    }

    #[sol(rpc)]
    interface IDisputeGameFactory {
        struct GameSearchResult {
            uint256 index;
            bytes32 metadata;
            uint64 timestamp;
            bytes32 rootClaim;
            bytes extraData;
        }

        function gameCount() external view returns (uint256 gameCount_);
        function findLatestGames(uint32 _gameType, uint256 _start, uint256 _n)
            external view returns (GameSearchResult[] memory games_);
    }
}

/// A dispute game whose output root covers a given L2 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GameRef {
    index: U256,
    l2_block: u64,
}

/// [`ChainMessenger`] for an OP-Stack L2 settling on L1 through
/// `OptimismPortal2` and fault-proof dispute games.
pub struct OpStackMessenger {
    l1: DynProvider,
    l2: DynProvider,
    portal: Address,
    l2_messenger: Address,
    message_passer: Address,
    /// Account that proves withdrawals, and therefore the only one allowed to
    /// finalize them through `finalizeWithdrawalTransactionExternalProof`.
    proof_submitter: Address,
}

impl OpStackMessenger {
    pub fn new(l1: DynProvider, l2: DynProvider, config: &OpStackConfig, proof_submitter: Address) -> Self {
        Self {
            l1,
            l2,
            portal: config.portal,
            l2_messenger: config.l2_messenger,
            message_passer: config.message_passer,
            proof_submitter,
        }
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        self.l2
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| Error::Chain(format!("Failed to get receipt {}: {}", tx_hash, e)))?
            .ok_or_else(|| Error::Chain(format!("No receipt for transaction {}", tx_hash)))
    }

    /// The withdrawal backing the `index`-th message of its transaction.
    async fn withdrawal(&self, message: &CrossChainMessage, index: usize) -> Result<(WithdrawalTransaction, B256)> {
        let receipt = self.receipt(message.transaction_hash).await?;
        extract_withdrawal(receipt.inner.logs(), self.message_passer, index)?.ok_or_else(|| {
            Error::Chain(format!(
                "Transaction {} has no withdrawal at index {}",
                message.transaction_hash, index
            ))
        })
    }

    async fn withdrawal_status(&self, withdrawal_hash: B256, l2_block: u64) -> Result<SettlementStatus> {
        let portal = IOptimismPortal2::new(self.portal, &self.l1);

        if portal.finalizedWithdrawals(withdrawal_hash).call().await.map_err(contract_error)? {
            return Ok(SettlementStatus::Settled);
        }

        let proven = portal
            .provenWithdrawals(withdrawal_hash, self.proof_submitter)
            .call()
            .await
            .map_err(contract_error)?;

        if proven.timestamp != 0 {
            if !self.game_still_valid(proven.disputeGameProxy).await? {
                debug!(%withdrawal_hash, game = %proven.disputeGameProxy, "Proof game was invalidated, proving again");
                return self.prove_status(l2_block).await;
            }
            return match portal.checkWithdrawal(withdrawal_hash, self.proof_submitter).call().await {
                Ok(_) => Ok(SettlementStatus::ReadyToRelay),
                Err(e) if e.as_revert_data().is_some() => {
                    debug!(%withdrawal_hash, "Withdrawal proven but not finalizable yet: {}", e);
                    Ok(SettlementStatus::Unready)
                }
                Err(e) => Err(contract_error(e)),
            };
        }

        self.prove_status(l2_block).await
    }

    async fn prove_status(&self, l2_block: u64) -> Result<SettlementStatus> {
        match self.latest_game_covering(l2_block).await? {
            Some(_) => Ok(SettlementStatus::ReadyToProve),
            None => Ok(SettlementStatus::Unready),
        }
    }

    /// Whether a proof against `game` can still be finalized: the portal has
    /// not blacklisted it, it was created under the current respected game
    /// type, and the challenger has not won it.
    async fn game_still_valid(&self, game: Address) -> Result<bool> {
        let portal = IOptimismPortal2::new(self.portal, &self.l1);
        if portal.disputeGameBlacklist(game).call().await.map_err(contract_error)? {
            return Ok(false);
        }

        let retired_before = portal.respectedGameTypeUpdatedAt().call().await.map_err(contract_error)?;
        let dispute_game = IDisputeGame::new(game, &self.l1);
        if dispute_game.createdAt().call().await.map_err(contract_error)? < retired_before {
            return Ok(false);
        }

        Ok(dispute_game.status().call().await.map_err(contract_error)? != CHALLENGER_WINS)
    }

    async fn latest_game_covering(&self, l2_block: u64) -> Result<Option<GameRef>> {
        let portal = IOptimismPortal2::new(self.portal, &self.l1);
        let factory_address = portal.disputeGameFactory().call().await.map_err(contract_error)?;
        let game_type = portal.respectedGameType().call().await.map_err(contract_error)?;

        let factory = IDisputeGameFactory::new(factory_address, &self.l1);
        let count = factory.gameCount().call().await.map_err(contract_error)?;
        if count.is_zero() {
            return Ok(None);
        }

        let games = factory
            .findLatestGames(game_type, count - U256::from(1), U256::from(GAME_SEARCH_DEPTH))
            .call()
            .await
            .map_err(contract_error)?;

        for game in games {
            match game_l2_block(&game.extraData) {
                Some(block) if block >= l2_block => {
                    return Ok(Some(GameRef { index: game.index, l2_block: block }));
                }
                Some(_) => {}
                None => warn!(game_index = %game.index, "Dispute game has malformed extra data"),
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl ChainMessenger for OpStackMessenger {
    async fn messages_by_transaction(&self, tx_hash: TxHash) -> Result<Vec<CrossChainMessage>> {
        let receipt = self.receipt(tx_hash).await?;
        extract_messages(receipt.inner.logs(), self.l2_messenger, tx_hash, receipt.block_number)
    }

    async fn message_status(&self, message: &CrossChainMessage, index: usize) -> Result<SettlementStatus> {
        let (_, withdrawal_hash) = self.withdrawal(message, index).await?;
        self.withdrawal_status(withdrawal_hash, message.block_number).await
    }

    async fn build_prove_transaction(&self, message: &CrossChainMessage, index: usize) -> Result<L1Transaction> {
        let (withdrawal, withdrawal_hash) = self.withdrawal(message, index).await?;
        let game = self
            .latest_game_covering(message.block_number)
            .await?
            .ok_or_else(|| Error::Chain(format!("No dispute game covers L2 block {}", message.block_number)))?;

        let block = self
            .l2
            .get_block_by_number(game.l2_block.into())
            .await
            .map_err(|e| Error::Chain(format!("Failed to get L2 block {}: {}", game.l2_block, e)))?
            .ok_or_else(|| Error::Chain(format!("L2 block {} not found", game.l2_block)))?;

        let proof = self
            .l2
            .get_proof(self.message_passer, vec![withdrawal_storage_slot(withdrawal_hash)])
            .block_id(game.l2_block.into())
            .await
            .map_err(|e| Error::Chain(format!("Failed to get withdrawal proof: {}", e)))?;
        let storage_root = proof.storage_hash;
        let withdrawal_proof = proof
            .storage_proof
            .into_iter()
            .next()
            .ok_or_else(|| Error::Chain("Node returned no storage proof".to_string()))?
            .proof;

        let call = IOptimismPortal2::proveWithdrawalTransactionCall {
            _tx: withdrawal,
            _disputeGameIndex: game.index,
            _outputRootProof: OutputRootProof {
                version: B256::ZERO,
                stateRoot: block.header.state_root,
                messagePasserStorageRoot: storage_root,
                latestBlockhash: block.header.hash,
            },
            _withdrawalProof: withdrawal_proof,
        };

        Ok(L1Transaction {
            to: self.portal,
            data: call.abi_encode().into(),
            value: U256::ZERO,
        })
    }

    async fn build_finalize_transaction(&self, message: &CrossChainMessage, index: usize) -> Result<L1Transaction> {
        let (withdrawal, _) = self.withdrawal(message, index).await?;
        let call = IOptimismPortal2::finalizeWithdrawalTransactionExternalProofCall {
            _tx: withdrawal,
            _proofSubmitter: self.proof_submitter,
        };

        Ok(L1Transaction {
            to: self.portal,
            data: call.abi_encode().into(),
            value: U256::ZERO,
        })
    }
}

fn contract_error(e: alloy::contract::Error) -> Error {
    Error::Chain(e.to_string())
}

fn is_event<E: SolEvent>(log: &Log, emitter: Address) -> bool {
    log.address() == emitter && log.topics().first() == Some(&E::SIGNATURE_HASH)
}

/// Decodes `SentMessage` logs of `messenger`, each paired with the
/// `SentMessageExtension1` that immediately follows it to recover the value.
fn extract_messages(
    logs: &[Log],
    messenger: Address,
    tx_hash: TxHash,
    block_number: Option<u64>,
) -> Result<Vec<CrossChainMessage>> {
    let mut messages = Vec::new();

    for (position, log) in logs.iter().enumerate() {
        if !is_event::<IL2CrossDomainMessenger::SentMessage>(log, messenger) {
            continue;
        }
        let sent = IL2CrossDomainMessenger::SentMessage::decode_log_data(log.data())
            .map_err(|e| Error::Serialization(format!("Bad SentMessage log in {}: {}", tx_hash, e)))?;

        let value = match logs.get(position + 1) {
            Some(next) if is_event::<IL2CrossDomainMessenger::SentMessageExtension1>(next, messenger) => {
                IL2CrossDomainMessenger::SentMessageExtension1::decode_log_data(next.data())
                    .map_err(|e| Error::Serialization(format!("Bad SentMessageExtension1 log in {}: {}", tx_hash, e)))?
                    .value
            }
            _ => U256::ZERO,
        };

        messages.push(CrossChainMessage {
            sender: sent.sender,
            target: sent.target,
            message: sent.message,
            value,
            min_gas_limit: sent.gasLimit,
            message_nonce: sent.messageNonce,
            block_number: block_number
                .or(log.block_number)
                .ok_or_else(|| Error::Chain(format!("Transaction {} has no block number", tx_hash)))?,
            transaction_hash: tx_hash,
            log_index: log.log_index.unwrap_or(position as u64),
        });
    }

    Ok(messages)
}

/// The `index`-th `MessagePassed` log of `message_passer`, as a withdrawal plus its hash.
fn extract_withdrawal(
    logs: &[Log],
    message_passer: Address,
    index: usize,
) -> Result<Option<(WithdrawalTransaction, B256)>> {
    let Some(log) = logs
        .iter()
        .filter(|log| is_event::<IL2ToL1MessagePasser::MessagePassed>(log, message_passer))
        .nth(index)
    else {
        return Ok(None);
    };

    let passed = IL2ToL1MessagePasser::MessagePassed::decode_log_data(log.data())
        .map_err(|e| Error::Serialization(format!("Bad MessagePassed log: {}", e)))?;

    let withdrawal = WithdrawalTransaction {
        nonce: passed.nonce,
        sender: passed.sender,
        target: passed.target,
        value: passed.value,
        gasLimit: passed.gasLimit,
        data: passed.data,
    };
    Ok(Some((withdrawal, passed.withdrawalHash)))
}

/// Storage slot of `sentMessages[withdrawal_hash]` in the message passer.
fn withdrawal_storage_slot(withdrawal_hash: B256) -> B256 {
    keccak256((withdrawal_hash, U256::ZERO).abi_encode())
}

/// L2 block number committed to by a fault dispute game's extra data.
fn game_l2_block(extra_data: &[u8]) -> Option<u64> {
    let word = extra_data.get(..32)?;
    u64::try_from(U256::from_be_slice(word)).ok()
}
