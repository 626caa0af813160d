//! Stakehouse server binary.

use clap::Parser;
use stakehouse::api::server::ApiServer;
use stakehouse::config::{ConfigLoader, StakehouseConfig};
use stakehouse::engine::SettlementEngine;
use stakehouse::games::vrf::VrfEngine;
use stakehouse::ledger::RocksLedger;
use stakehouse::storage::Storage;
use std::sync::Arc;
use tracing::info;

const VRF_KEYPAIR_KEY: &[u8] = b"vrf:keypair";

#[derive(Parser, Debug)]
#[command(name = "stakehouse")]
#[command(about = "Casino wagering settlement engine", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// API server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// API server port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Data directory (overrides config)
    #[arg(long)]
    data_dir: Option<String>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stakehouse=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config: StakehouseConfig = loader.load()?;

    if let Some(host) = args.host {
        config.api.listen_address = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(origins) = args.cors_origins {
        config.api.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
    }

    info!(data_dir = %config.storage.data_dir, "opening ledger database");
    let storage = Storage::open(&config.storage.data_dir)?;

    // The VRF keypair persists with the ledger so committed rounds stay
    // verifiable across restarts.
    let vrf = match storage.get(VRF_KEYPAIR_KEY) {
        Some(bytes) => VrfEngine::from_bytes(&bytes)?,
        None => {
            let vrf = VrfEngine::new_random();
            storage.put(VRF_KEYPAIR_KEY, &vrf.to_bytes())?;
            vrf
        }
    };
    info!(public_key = %vrf.public_key_hex(), "fairness engine ready");

    let ledger = Arc::new(RocksLedger::new(storage));
    let engine = Arc::new(SettlementEngine::new(
        ledger,
        Arc::new(vrf),
        config.engine.clone(),
    ));

    let server = ApiServer::new(config.api.clone(), engine);
    server.run().await?;

    Ok(())
}
