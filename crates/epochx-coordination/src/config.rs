use std::sync::Arc;
use std::time::Duration;

use epochx_core::error::ProverError;
use epochx_p2p::{P2pConfig, P2pNetwork};
use tracing::info;

use crate::{DirectCoordination, P2pCoordination, ProverCoordination};

/// Which coordination variant the node runs with.
#[derive(Debug, Clone)]
pub enum CoordinationConfig {
    /// Join the gossip network.
    P2p {
        network: P2pConfig,
        /// How long `fetch_transactions` waits for a peer's answer.
        request_timeout: Duration,
    },
    /// Talk to one trusted node over JSON-RPC.
    Direct { node_url: String },
}

/// Build the configured coordination variant. For `P2p` this also spawns the
/// libp2p event loop, so it must run inside a tokio runtime.
pub fn create_prover_coordination(
    config: &CoordinationConfig,
) -> Result<Arc<dyn ProverCoordination>, ProverError> {
    match config {
        CoordinationConfig::P2p { network, request_timeout } => {
            let (net, handle) = P2pNetwork::new(network)?;
            tokio::spawn(net.run());
            info!(listen = %network.listen_addr, peers = network.bootstrap_peers.len(), "using p2p coordination");
            Ok(Arc::new(P2pCoordination::new(handle, *request_timeout)))
        }
        CoordinationConfig::Direct { node_url } => {
            info!(node = %node_url, "using direct coordination");
            Ok(Arc::new(DirectCoordination::new(node_url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn direct_variant_needs_no_network() {
        let config = CoordinationConfig::Direct { node_url: "http://127.0.0.1:1".into() };
        assert!(create_prover_coordination(&config).is_ok());
    }

    #[tokio::test]
    async fn bad_listen_address_is_a_transport_error() {
        let config = CoordinationConfig::P2p {
            network: P2pConfig { listen_addr: "not a multiaddr".into(), ..P2pConfig::default() },
            request_timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            create_prover_coordination(&config),
            Err(ProverError::Transport(_))
        ));
    }
}
