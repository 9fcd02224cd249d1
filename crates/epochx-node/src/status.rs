use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use tracing::info;

use epochx_rpc::{EpochxApiServer, RpcBond, RpcEpochState, RpcHealth, RpcReservation};

use crate::node::ProverNode;

/// Read-only JSON-RPC view of a running node.
pub struct StatusServer {
    node: Arc<ProverNode>,
}

impl StatusServer {
    pub fn new(node: Arc<ProverNode>) -> Self {
        Self { node }
    }

    /// Start the status server on `addr`. Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let server = Server::builder().build(addr).await?;
        let local = server.local_addr()?;
        let handle = server.start(self.into_rpc());
        info!(addr = %local, "status RPC server started");
        Ok(handle)
    }
}

#[async_trait]
impl EpochxApiServer for StatusServer {
    async fn get_epoch_states(&self) -> RpcResult<Vec<RpcEpochState>> {
        Ok(self.node.states().iter().map(RpcEpochState::from).collect())
    }

    async fn get_health(&self) -> RpcResult<RpcHealth> {
        let report = self.node.health();
        Ok(RpcHealth {
            status: report.status.to_string(),
            consecutive_chain_failures: report.consecutive_chain_failures,
            last_error: report.last_error,
            cursor: report.cursor.map(|c| c.to_string()),
        })
    }

    async fn get_bond(&self) -> RpcResult<RpcBond> {
        let prover = self.node.address();
        let bonds = self.node.bonds();
        let outstanding = bonds
            .outstanding()
            .iter()
            .filter(|r| r.prover == prover)
            .map(RpcReservation::from)
            .collect();
        Ok(RpcBond {
            prover: prover.to_string(),
            balance: bonds.balance(&prover).to_string(),
            available: bonds.available(&prover).to_string(),
            reserved: bonds.reserved_total(&prover).to_string(),
            outstanding,
        })
    }

    async fn get_prover_address(&self) -> RpcResult<String> {
        Ok(self.node.address().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epochx_core::types::{B256, U256};
    use epochx_core::NodeOptions;
    use epochx_crypto::QuoteSigner;
    use epochx_rpc::JsonRpcClient;
    use serde_json::json;

    use epochx_coordination::DirectCoordination;

    use crate::clients::{RpcJobBroker, RpcSettlementChain};
    use crate::node::Collaborators;
    use crate::quote_provider::SimpleQuoteProvider;

    fn node() -> Arc<ProverNode> {
        let collaborators = Collaborators {
            chain: Arc::new(RpcSettlementChain::new("http://127.0.0.1:1")),
            broker: Arc::new(RpcJobBroker::new("http://127.0.0.1:1")),
            coordination: Arc::new(DirectCoordination::new("http://127.0.0.1:1")),
            provider: Arc::new(SimpleQuoteProvider::new(250, U256::from(1000u64))),
        };
        let signer = QuoteSigner::from_bytes(&B256::repeat_byte(0x11)).unwrap();
        Arc::new(ProverNode::new(collaborators, signer, NodeOptions::default()))
    }

    #[tokio::test]
    async fn serves_bond_and_address() {
        let node = node();
        node.deposit(U256::from(5000u64)).unwrap();
        node.bonds().reserve(node.address(), U256::from(3u64), U256::from(1000u64)).unwrap();

        let server = Server::builder().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let _handle = server.start(StatusServer::new(node.clone()).into_rpc());
        let client = JsonRpcClient::new(&format!("http://{addr}"));

        let bond: RpcBond = client.call("epochx_getBond", json!([])).await.unwrap();
        assert_eq!(bond.balance, "5000");
        assert_eq!(bond.available, "4000");
        assert_eq!(bond.reserved, "1000");
        assert_eq!(bond.outstanding.len(), 1);
        assert_eq!(bond.outstanding[0].epoch, "3");

        let address: String = client.call("epochx_getProverAddress", json!([])).await.unwrap();
        assert_eq!(address, node.address().to_string());

        let health: RpcHealth = client.call("epochx_getHealth", json!([])).await.unwrap();
        assert_eq!(health.status, "Healthy");
        assert_eq!(health.cursor, None);

        let states: Vec<RpcEpochState> = client.call("epochx_getEpochStates", json!([])).await.unwrap();
        assert!(states.is_empty());
    }
}
