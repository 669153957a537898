use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use crate::Error;

pub const SIGNER_KEY_ENV: &str = "SUCKER_SIGNER_KEY";
pub const RELAY_API_KEY_ENV: &str = "SUCKER_RELAY_API_KEY";
pub const RELAY_API_SECRET_ENV: &str = "SUCKER_RELAY_API_SECRET";

/// OP-Stack predeploys, identical on every Bedrock chain.
pub const L2_CROSS_DOMAIN_MESSENGER: Address = address!("0x4200000000000000000000000000000000000007");
pub const L2_TO_L1_MESSAGE_PASSER: Address = address!("0x4200000000000000000000000000000000000016");

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

/// The sucker pair plus the standard bridge on L1. Kept as strings so that any
/// casing is accepted; see [`BridgeConfig::addresses`].
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BridgeConfig {
    pub local_sucker: String,
    pub remote_sucker: String,
    pub standard_bridge: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeAddresses {
    pub local_sucker: Address,
    pub remote_sucker: Address,
    pub standard_bridge: Address,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpStackConfig {
    /// OptimismPortal on L1.
    pub portal: Address,
    #[serde(default = "default_l2_messenger")]
    pub l2_messenger: Address,
    #[serde(default = "default_message_passer")]
    pub message_passer: Address,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayerConfig {
    /// Seconds between two passes of the unattended loop.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SubmitterConfig {
    Direct {
        #[serde(default)]
        private_key: Option<String>,
    },
    Relay {
        api_url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        api_secret: Option<String>,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub l1: ChainConfig,
    pub l2: ChainConfig,
    pub bridge: BridgeConfig,
    pub op_stack: OpStackConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub relayer: RelayerConfig,
    pub submitter: SubmitterConfig,
}

fn default_l2_messenger() -> Address {
    L2_CROSS_DOMAIN_MESSENGER
}

fn default_message_passer() -> Address {
    L2_TO_L1_MESSAGE_PASSER
}

fn default_lookback_blocks() -> u64 {
    10_000
}

fn default_page_size() -> u64 {
    100
}

fn default_poll_interval() -> u64 {
    300
}

fn default_confirmations() -> u64 {
    3
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lookback_blocks: default_lookback_blocks(),
            page_size: default_page_size(),
        }
    }
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            confirmations: default_confirmations(),
        }
    }
}

impl BridgeConfig {
    /// Parses the configured addresses. Parsing ignores checksum casing, so
    /// lower-, upper- and mixed-case inputs resolve to the same address.
    pub fn addresses(&self) -> Result<BridgeAddresses, Error> {
        Ok(BridgeAddresses {
            local_sucker: parse_address("bridge.local_sucker", &self.local_sucker)?,
            remote_sucker: parse_address("bridge.remote_sucker", &self.remote_sucker)?,
            standard_bridge: parse_address("bridge.standard_bridge", &self.standard_bridge)?,
        })
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, Error> {
    let trimmed = value.trim();
    let prefixed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        format!("0x{}", &trimmed[2..])
    } else {
        format!("0x{}", trimmed)
    };
    Address::from_str(&prefixed)
        .map_err(|e| Error::Config(format!("Invalid address for {}: {} ({})", field, value, e)))
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml(&config_str)?;
        config.apply_env_secrets();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(config_str: &str) -> Result<Self, Error> {
        toml::from_str(config_str)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Fills secrets missing from the file from the process environment.
    pub fn apply_env_secrets(&mut self) {
        match &mut self.submitter {
            SubmitterConfig::Direct { private_key } => {
                if private_key.is_none() {
                    *private_key = std::env::var(SIGNER_KEY_ENV).ok();
                }
            }
            SubmitterConfig::Relay { api_key, api_secret, .. } => {
                if api_key.is_none() {
                    *api_key = std::env::var(RELAY_API_KEY_ENV).ok();
                }
                if api_secret.is_none() {
                    *api_secret = std::env::var(RELAY_API_SECRET_ENV).ok();
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (name, chain) in [("l1", &self.l1), ("l2", &self.l2)] {
            if chain.rpc_url.trim().is_empty() {
                return Err(Error::Config(format!("{}.rpc_url must not be empty", name)));
            }
            reqwest::Url::parse(&chain.rpc_url)
                .map_err(|e| Error::Config(format!("Invalid {}.rpc_url: {}", name, e)))?;
            if chain.chain_id == 0 {
                return Err(Error::Config(format!("{}.chain_id must be greater than 0", name)));
            }
        }
        if self.l1.chain_id == self.l2.chain_id {
            return Err(Error::Config("l1 and l2 must use different chain ids".to_string()));
        }

        self.bridge.addresses()?;

        if self.scan.page_size == 0 {
            return Err(Error::Config("Scan page size must be greater than 0".to_string()));
        }
        if self.relayer.poll_interval == 0 {
            return Err(Error::Config("Relayer poll interval must be greater than 0".to_string()));
        }
        if self.relayer.confirmations == 0 {
            return Err(Error::Config("Relayer confirmations must be greater than 0".to_string()));
        }

        match &self.submitter {
            SubmitterConfig::Direct { private_key } => {
                let key = private_key.as_deref().ok_or_else(|| {
                    Error::Config(format!("Direct mode needs a private key (or {})", SIGNER_KEY_ENV))
                })?;
                let raw = hex::decode(key.trim().trim_start_matches("0x"))
                    .map_err(|_| Error::Config("Private key is not valid hex".to_string()))?;
                if raw.len() != 32 {
                    return Err(Error::Config(format!(
                        "Private key must be 32 bytes, got {}",
                        raw.len()
                    )));
                }
            }
            SubmitterConfig::Relay { api_url, api_key, api_secret } => {
                reqwest::Url::parse(api_url)
                    .map_err(|e| Error::Config(format!("Invalid relay api_url: {}", e)))?;
                if api_key.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::Config(format!("Relay mode needs api_key (or {})", RELAY_API_KEY_ENV)));
                }
                if api_secret.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::Config(format!(
                        "Relay mode needs api_secret (or {})",
                        RELAY_API_SECRET_ENV
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn mode(&self) -> &'static str {
        match self.submitter {
            SubmitterConfig::Direct { .. } => "direct",
            SubmitterConfig::Relay { .. } => "relay",
        }
    }
}
