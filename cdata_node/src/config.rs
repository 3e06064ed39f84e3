//! Node configuration
//!
//! Settings are layered as defaults < optional config file < environment and
//! resolved exactly once into an immutable [`Settings`] value. All devnet /
//! mainnet branching happens in [`Settings::resolve`].

use ethers::types::{Address, H256, U256};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::wallet::{self, ServerWallet};

/// Default EAS deployment on OP-stack chains (predeploy address)
pub const DEFAULT_EAS_CONTRACT: &str = "0x4200000000000000000000000000000000000021";

const DEVNET_NODE_URL: &str = "https://devnet.irys.xyz";
const MAINNET_NODE_URL: &str = "https://node2.irys.xyz";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Deployment environment, controls how much of an internal error leaks to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid {
                field: "APP_ENV",
                reason: format!("unknown environment '{}'", other),
            }),
        }
    }
}

/// Irys network the node pays into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Devnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Mainnet => "mainnet",
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" | "testnet" => Ok(Network::Devnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(ConfigError::Invalid {
                field: "IRYS_NETWORK",
                reason: format!("unknown network '{}'", other),
            }),
        }
    }
}

/// Raw, unresolved settings as read from file and environment.
///
/// Field names match the lowercased environment variable names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub app_env: Option<String>,
    pub irys_network: Option<String>,
    pub irys_node_url: Option<String>,
    pub irys_payment_token: Option<String>,
    pub rpc_url: Option<String>,
    pub ethereum_mainnet_rpc_url: Option<String>,
    pub base_sepolia_rpc_url: Option<String>,
    pub server_evm_private_key: Option<String>,
    pub eas_contract_address: Option<String>,
    pub eas_schema_uid: Option<String>,
    pub eas_rpc_url: Option<String>,
    pub eas_chain_id: Option<u64>,
    pub sponsor_approval_amount_atomic: Option<String>,
    pub irys_delegation_duration_days: Option<u32>,
    pub default_fund_amount: Option<String>,
    pub token_decimals: Option<u32>,
    pub approvals_db_path: Option<String>,
    pub verify_upload_signatures: Option<bool>,
    pub allowed_users: Option<String>,
    pub max_upload_bytes: Option<usize>,
    pub http_timeout_secs: Option<u64>,
}

impl RawSettings {
    /// Read settings from an optional config file and the process environment
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let raw = builder
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize::<RawSettings>()?;
        Ok(raw)
    }
}

/// Private key wrapper that never prints its contents
#[derive(Clone)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub node_url: String,
    pub token: String,
    /// RPC of the chain the payment token lives on
    pub rpc_url: String,
    pub token_decimals: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AttestationSettings {
    pub contract: Address,
    pub schema_uid: Option<H256>,
    pub rpc_url: String,
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SponsorshipSettings {
    pub approval_amount_atomic: U256,
    pub delegation_duration: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub verify_signatures: bool,
    pub max_upload_bytes: usize,
    pub allowed_users: Vec<String>,
    pub default_fund_amount: String,
}

/// Fully resolved node settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub network: Network,
    pub server_private_key: PrivateKey,
    pub gateway: GatewaySettings,
    pub attestation: AttestationSettings,
    pub sponsorship: SponsorshipSettings,
    pub uploads: UploadSettings,
    pub approvals_db_path: PathBuf,
}

impl Settings {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::resolve(RawSettings::load(config_path)?)
    }

    pub fn resolve(raw: RawSettings) -> Result<Self, ConfigError> {
        let environment = match raw.app_env.as_deref() {
            Some(env) => env.parse()?,
            None => Environment::Production,
        };
        let network = match raw.irys_network.as_deref() {
            Some(network) => network.parse()?,
            None => Network::Devnet,
        };

        let private_key = raw
            .server_evm_private_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::Missing("SERVER_EVM_PRIVATE_KEY"))?;
        // Reject unusable keys at startup rather than on first request
        ServerWallet::from_private_key(&private_key).map_err(|e| ConfigError::Invalid {
            field: "SERVER_EVM_PRIVATE_KEY",
            reason: e.to_string(),
        })?;

        let (default_node, default_token, fallback_rpc) = match network {
            Network::Devnet => (DEVNET_NODE_URL, "base-eth", raw.base_sepolia_rpc_url.clone()),
            Network::Mainnet => (MAINNET_NODE_URL, "ethereum", raw.ethereum_mainnet_rpc_url.clone()),
        };
        let rpc_url = raw
            .rpc_url
            .or(fallback_rpc)
            .or(raw.ethereum_mainnet_rpc_url)
            .or(raw.base_sepolia_rpc_url)
            .ok_or(ConfigError::Missing("RPC_URL"))?;

        let token_decimals = raw.token_decimals.unwrap_or(18);
        let gateway = GatewaySettings {
            node_url: raw
                .irys_node_url
                .unwrap_or_else(|| default_node.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: raw
                .irys_payment_token
                .unwrap_or_else(|| default_token.to_string()),
            rpc_url: rpc_url.clone(),
            token_decimals,
            timeout: Duration::from_secs(raw.http_timeout_secs.unwrap_or(60)),
        };

        let contract = raw
            .eas_contract_address
            .as_deref()
            .unwrap_or(DEFAULT_EAS_CONTRACT)
            .parse::<Address>()
            .map_err(|e| ConfigError::Invalid {
                field: "EAS_CONTRACT_ADDRESS",
                reason: e.to_string(),
            })?;
        let schema_uid = raw
            .eas_schema_uid
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.parse::<H256>().map_err(|e| ConfigError::Invalid {
                    field: "EAS_SCHEMA_UID",
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        let attestation = AttestationSettings {
            contract,
            schema_uid,
            rpc_url: raw.eas_rpc_url.unwrap_or(rpc_url),
            chain_id: raw.eas_chain_id,
        };

        let approval_amount_atomic = match raw.sponsor_approval_amount_atomic {
            Some(amount) => U256::from_dec_str(amount.trim()).map_err(|e| ConfigError::Invalid {
                field: "SPONSOR_APPROVAL_AMOUNT_ATOMIC",
                reason: e.to_string(),
            })?,
            // 0.01 of an 18-decimal token
            None => U256::exp10(16),
        };
        let sponsorship = SponsorshipSettings {
            approval_amount_atomic,
            delegation_duration: chrono::Duration::days(
                raw.irys_delegation_duration_days.unwrap_or(30) as i64,
            ),
        };

        let default_fund_amount = raw.default_fund_amount.unwrap_or_else(|| "0.005".to_string());
        wallet::to_atomic(&default_fund_amount, token_decimals).map_err(|e| ConfigError::Invalid {
            field: "DEFAULT_FUND_AMOUNT",
            reason: e.to_string(),
        })?;
        let uploads = UploadSettings {
            verify_signatures: raw.verify_upload_signatures.unwrap_or(true),
            max_upload_bytes: raw.max_upload_bytes.unwrap_or(25 * 1024 * 1024),
            allowed_users: raw
                .allowed_users
                .map(|users| {
                    users
                        .split(',')
                        .map(str::trim)
                        .filter(|u| !u.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            default_fund_amount,
        };

        Ok(Settings {
            host: raw.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: raw.port.unwrap_or(3001),
            environment,
            network,
            server_private_key: PrivateKey(private_key),
            gateway,
            attestation,
            sponsorship,
            uploads,
            approvals_db_path: PathBuf::from(
                raw.approvals_db_path.unwrap_or_else(|| "db.json".to_string()),
            ),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}
