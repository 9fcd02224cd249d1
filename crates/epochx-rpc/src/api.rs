use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{RpcBond, RpcEpochState, RpcHealth};

/// Prover node status API.
///
/// All method names are prefixed with "epochx_" via `namespace = "epochx"`.
#[rpc(server, namespace = "epochx")]
pub trait EpochxApi {
    /// Every epoch the node has considered, oldest first.
    #[method(name = "getEpochStates")]
    async fn get_epoch_states(&self) -> RpcResult<Vec<RpcEpochState>>;

    /// Liveness of the settlement-chain connection.
    #[method(name = "getHealth")]
    async fn get_health(&self) -> RpcResult<RpcHealth>;

    /// The node prover's bond ledger.
    #[method(name = "getBond")]
    async fn get_bond(&self) -> RpcResult<RpcBond>;

    /// The address every quote from this node names as `prover` (0x-hex).
    #[method(name = "getProverAddress")]
    async fn get_prover_address(&self) -> RpcResult<String>;
}
