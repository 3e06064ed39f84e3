use anyhow::{Context, Result};
use cdata_node::{
    api::{start_api_server, AppState},
    attestation::EasAttestor,
    config::Settings,
    gateway::{IrysGateway, StorageGateway},
    storage::JsonFileApprovalStore,
    wallet::{from_atomic, ServerWallet},
};
use clap::Parser;
use ethers::providers::{Http, Middleware, Provider};
use log::{error, info, warn};
use std::convert::TryFrom;
use std::path::PathBuf;
use std::sync::Arc;

/// C-Data node arguments
#[derive(Parser)]
#[clap(name = "cdata-node")]
#[clap(about = "C-Data backend - sponsored Arweave photo uploads and EAS attestations")]
struct Args {
    /// Optional configuration file (TOML/YAML/JSON); environment variables override it
    #[clap(long, env = "CDATA_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[clap(long)]
    port: Option<u16>,

    /// Address to bind
    #[clap(long)]
    host: Option<String>,
}

/// Log the server's storage balance and native chain balance. Never fatal.
async fn startup_balance_check(settings: &Settings, wallet: &ServerWallet, gateway: &dyn StorageGateway) {
    let decimals = settings.gateway.token_decimals;
    match gateway.loaded_balance().await {
        Ok(balance) => {
            let standard = from_atomic(balance, decimals).unwrap_or_default();
            info!("Irys balance: {} atomic ({} {})", balance, standard, gateway.token());
            if balance.is_zero() {
                warn!("Irys balance is zero; fund it through POST /api/fundIrysNode before uploading");
            }
        }
        Err(e) => error!("Failed to read Irys balance: {}", e),
    }

    let provider = match Provider::<Http>::try_from(settings.gateway.rpc_url.as_str()) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Invalid RPC url {}: {}", settings.gateway.rpc_url, e);
            return;
        }
    };
    match provider.get_balance(wallet.address(), None).await {
        Ok(balance) => info!(
            "Server wallet native balance: {}",
            from_atomic(balance, 18).unwrap_or_default()
        ),
        Err(e) => warn!("Failed to read server wallet native balance: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(host) = args.host {
        settings.host = host;
    }

    let wallet = Arc::new(ServerWallet::from_private_key(
        settings.server_private_key.expose(),
    )?);

    info!("Starting C-Data backend...");
    info!("Environment: {:?}", settings.environment);
    info!("Irys network: {}", settings.network.as_str());
    info!("Irys node: {}", settings.gateway.node_url);
    info!("Payment token: {}", settings.gateway.token);
    info!("Server EVM address: {}", wallet.checksum_address());
    match settings.attestation.schema_uid {
        Some(uid) => info!("EAS contract {:?}, schema {:?}", settings.attestation.contract, uid),
        None => warn!("EAS_SCHEMA_UID not set; attestations are disabled"),
    }

    let gateway = Arc::new(IrysGateway::new(&settings.gateway, wallet.clone())?);
    let attestor = Arc::new(EasAttestor::new(&settings.attestation, wallet.clone())?);
    let approvals = Arc::new(
        JsonFileApprovalStore::open(&settings.approvals_db_path)
            .await
            .with_context(|| {
                format!("failed to open approval store {}", settings.approvals_db_path.display())
            })?,
    );
    info!("Approval store: {}", approvals.path().display());

    startup_balance_check(&settings, &wallet, gateway.as_ref()).await;

    let state = AppState::new(settings, wallet, gateway, attestor, approvals);
    start_api_server(state).await
}
