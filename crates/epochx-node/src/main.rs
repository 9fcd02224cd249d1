//! epochx-node — the epoch proof-quote prover binary.
//!
//! Startup sequence:
//!   1. Build the node configuration from the command line
//!   2. Open (or initialise) the state database and restore the ledger
//!   3. Start coordination (libp2p gossip or a trusted node over JSON-RPC)
//!   4. Start the status JSON-RPC server, if enabled
//!   5. Run both monitors until ctrl-c, then stop and flush

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use zeroize::Zeroizing;

use epochx_coordination::CoordinationConfig;
use epochx_core::constants::{
    DEFAULT_CHAIN_FAILURE_THRESHOLD, DEFAULT_MAX_PARALLEL_BLOCKS_PER_EPOCH,
    DEFAULT_MAX_PENDING_JOBS, DEFAULT_POLLING_INTERVAL_MS, DEFAULT_QUOTE_VALIDITY_SLOTS,
};
use epochx_core::types::U256;
use epochx_core::NodeOptions;
use epochx_node::{ProverNode, ProverNodeConfig, QuoteProviderConfig, StatusServer};
use epochx_p2p::P2pConfig;

#[derive(Parser, Debug)]
#[command(
    name = "epochx-node",
    version,
    about = "Epoch proof-quote prover: bids bonded quotes for proving completed epochs"
)]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, default_value = "~/.epochx/data")]
    data_dir: PathBuf,

    /// Prover private key (hex). Prefer the environment variable.
    #[arg(long, env = "EPOCHX_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Settlement-chain log indexer JSON-RPC URL.
    #[arg(long, default_value = "http://127.0.0.1:8546")]
    indexer_url: String,

    /// Proving job broker JSON-RPC URL.
    #[arg(long, default_value = "http://127.0.0.1:8547")]
    broker_url: String,

    /// P2P listen address (gossip coordination).
    #[arg(long, default_value = "/ip4/0.0.0.0/tcp/7878")]
    p2p_listen: String,

    /// Bootstrap peer multiaddresses (comma-separated).
    #[arg(long, value_delimiter = ',')]
    bootstrap: Vec<String>,

    /// Seconds to wait for a peer to answer a transaction request.
    #[arg(long, default_value_t = 30)]
    p2p_request_timeout: u64,

    /// Trusted node JSON-RPC URL. Selects direct coordination instead of p2p.
    #[arg(long, conflicts_with_all = ["bootstrap"])]
    node_url: Option<String>,

    /// Pricing service URL. Without it every quote uses the fixed fee and bond.
    #[arg(long)]
    quote_provider_url: Option<String>,

    /// Fixed fee in basis points (0..=10000).
    #[arg(long, default_value_t = 0)]
    basis_point_fee: i64,

    /// Fixed bond per quote (decimal or 0x-hex).
    #[arg(long, default_value = "0")]
    bond_amount: String,

    /// Bond credited to the prover when the ledger has never seen it.
    #[arg(long, default_value = "0")]
    initial_deposit: String,

    /// Poll interval for both monitors (milliseconds).
    #[arg(long, default_value_t = DEFAULT_POLLING_INTERVAL_MS)]
    polling_interval_ms: u64,

    /// Published quotes allowed to await resolution at once.
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING_JOBS)]
    max_pending_jobs: usize,

    /// Proving jobs allowed in flight at once.
    #[arg(long, default_value_t = DEFAULT_MAX_PARALLEL_BLOCKS_PER_EPOCH)]
    max_parallel_blocks_per_epoch: usize,

    /// Validity window for quotes whose terms carry no slot.
    #[arg(long, default_value_t = DEFAULT_QUOTE_VALIDITY_SLOTS)]
    quote_validity_slots: u64,

    /// Consecutive failed chain reads before health reports Degraded.
    #[arg(long, default_value_t = DEFAULT_CHAIN_FAILURE_THRESHOLD)]
    chain_failure_threshold: u32,

    /// Status JSON-RPC listen address. Disabled when absent.
    #[arg(long)]
    status_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,epochx=debug")),
        )
        .init();

    let args = Args::parse();
    info!("epochx prover node starting");

    let config = build_config(args)?;
    if let Some(dir) = &config.data_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data dir {}", dir.display()))?;
    }
    info!(config = ?config, "configuration");

    let node = Arc::new(ProverNode::from_config(&config).context("building prover node")?);
    info!(prover = %node.address(), "prover identity");

    let status = match config.status_addr {
        Some(addr) => Some(
            StatusServer::new(node.clone())
                .start(addr)
                .await
                .context("starting status RPC server")?,
        ),
        None => None,
    };

    node.start().context("starting prover node")?;
    info!("node ready");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");

    node.stop().await.context("stopping prover node")?;
    if let Some(handle) = status {
        if let Err(e) = handle.stop() {
            warn!(error = %e, "status server already stopped");
        }
    }
    Ok(())
}

fn build_config(args: Args) -> anyhow::Result<ProverNodeConfig> {
    let coordination = match args.node_url {
        Some(node_url) => CoordinationConfig::Direct { node_url },
        None => CoordinationConfig::P2p {
            network: P2pConfig {
                listen_addr: args.p2p_listen,
                bootstrap_peers: args.bootstrap,
                ..P2pConfig::default()
            },
            request_timeout: Duration::from_secs(args.p2p_request_timeout),
        },
    };
    let quote_provider = match args.quote_provider_url {
        Some(url) => QuoteProviderConfig::Http { url },
        None => QuoteProviderConfig::Fixed {
            basis_point_fee: args.basis_point_fee,
            bond_amount: parse_amount(&args.bond_amount).context("parsing --bond-amount")?,
        },
    };
    Ok(ProverNodeConfig {
        data_dir: Some(expand_tilde(&args.data_dir)),
        private_key: Zeroizing::new(args.private_key),
        indexer_url: args.indexer_url,
        broker_url: args.broker_url,
        coordination,
        quote_provider,
        initial_deposit: parse_amount(&args.initial_deposit).context("parsing --initial-deposit")?,
        status_addr: args.status_addr,
        options: NodeOptions {
            polling_interval_ms: args.polling_interval_ms,
            max_pending_jobs: args.max_pending_jobs,
            max_parallel_blocks_per_epoch: args.max_parallel_blocks_per_epoch,
            quote_validity_slots: args.quote_validity_slots,
            chain_failure_threshold: args.chain_failure_threshold,
        },
    })
}

fn parse_amount(s: &str) -> anyhow::Result<U256> {
    s.trim()
        .parse::<U256>()
        .map_err(|e| anyhow::anyhow!("invalid amount {s:?}: {e}"))
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
