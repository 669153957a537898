use alloy::primitives::Address;
use alloy::sol;
use alloy::sol_types::SolCall;
use tracing::debug;

use crate::{
    config::BridgeAddresses,
    types::{CrossChainMessage, MessagePriority},
};

sol! {
    /// L1StandardBridge entry point reached when an ERC20 withdrawal is relayed.
    interface IStandardBridge {
        function finalizeBridgeERC20(
            address _localToken,
            address _remoteToken,
            address _from,
            address _to,
            uint256 _amount,
            bytes _extraData
        ) external;
    }
}

/// Decides whether a message belongs to this sucker pair and how important it is.
///
/// Rules are tried in order and the first match wins:
/// 1. the message targets the standard bridge and its `finalizeBridgeERC20`
///    recipient is the local sucker: a token transfer, [`MessagePriority::ValueMessage`];
/// 2. the message goes from the remote sucker to the local sucker: a value
///    transfer when it carries ETH, otherwise a root sync
///    ([`MessagePriority::InformationalMessage`]).
///
/// Everything else is [`MessagePriority::Ignore`].
pub fn classify(
    message: &CrossChainMessage,
    local_sucker: Address,
    remote_sucker: Address,
    standard_bridge: Address,
) -> MessagePriority {
    if message.target == standard_bridge && token_recipient(message) == Some(local_sucker) {
        return MessagePriority::ValueMessage;
    }

    if message.sender == remote_sucker && message.target == local_sucker {
        return if message.value.is_zero() {
            MessagePriority::InformationalMessage
        } else {
            MessagePriority::ValueMessage
        };
    }

    MessagePriority::Ignore
}

/// [`classify`] with the configured address triple.
pub fn classify_with(message: &CrossChainMessage, bridge: &BridgeAddresses) -> MessagePriority {
    classify(message, bridge.local_sucker, bridge.remote_sucker, bridge.standard_bridge)
}

/// Recipient of a `finalizeBridgeERC20` payload. The selector is skipped, not
/// checked: a target match alone says nothing about the call shape, so any
/// payload that does not decode is treated as "no recipient".
fn token_recipient(message: &CrossChainMessage) -> Option<Address> {
    let Some(args) = message.message.get(4..) else {
        debug!(tx_hash = %message.transaction_hash, "Standard bridge payload shorter than a selector");
        return None;
    };

    match IStandardBridge::finalizeBridgeERC20Call::abi_decode_raw(args) {
        Ok(call) => Some(call._to),
        Err(e) => {
            debug!(
                tx_hash = %message.transaction_hash,
                "Standard bridge payload is not finalizeBridgeERC20: {}", e
            );
            None
        }
    }
}
