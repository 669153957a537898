//! Alloy provider construction shared by the scanner, the messenger and the
//! direct submitter.

use alloy::{
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};
use std::str::FromStr;
use tracing::info;

use crate::{config::ChainConfig, Error, Result};

fn rpc_url(chain: &ChainConfig) -> Result<reqwest::Url> {
    reqwest::Url::parse(&chain.rpc_url)
        .map_err(|e| Error::Config(format!("Invalid rpc url {}: {}", chain.rpc_url, e)))
}

/// Read-only HTTP provider for `chain`.
pub fn connect(chain: &ChainConfig) -> Result<DynProvider> {
    Ok(ProviderBuilder::new().connect_http(rpc_url(chain)?).erased())
}

/// HTTP provider that signs and sends with `signer`.
pub fn connect_with_signer(chain: &ChainConfig, signer: PrivateKeySigner) -> Result<DynProvider> {
    Ok(ProviderBuilder::new().wallet(signer).connect_http(rpc_url(chain)?).erased())
}

pub fn parse_signer(private_key: &str) -> Result<PrivateKeySigner> {
    PrivateKeySigner::from_str(private_key.trim())
        .map_err(|e| Error::Config(format!("Invalid private key: {}", e)))
}

/// Fails when the node behind `provider` serves a different chain than configured.
pub async fn ensure_chain_id(provider: &DynProvider, chain: &ChainConfig) -> Result<()> {
    let actual = provider
        .get_chain_id()
        .await
        .map_err(|e| Error::Network(format!("Failed to get chain id from {}: {}", chain.rpc_url, e)))?;

    if actual != chain.chain_id {
        return Err(Error::Config(format!(
            "Chain id mismatch for {}: expected {}, node reports {}",
            chain.rpc_url, chain.chain_id, actual
        )));
    }

    info!(chain_id = actual, "Connected to {}", chain.rpc_url);
    Ok(())
}
