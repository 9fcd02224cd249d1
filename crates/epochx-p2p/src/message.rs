use epochx_core::error::ProverError;
use epochx_core::types::{Epoch, TxEnvelope};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Messages exchanged over the quote gossip topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum P2pMessage {
    /// A prover is broadcasting a signed quote.
    /// `payload` is the signed quote's wire form (payload ‖ signature).
    EpochProofQuote { payload: Vec<u8> },

    /// Ask peers for the transactions of a completed epoch.
    RequestEpochTxs { epoch: Epoch },

    /// A peer's answer to `RequestEpochTxs`, in block order.
    EpochTxs { epoch: Epoch, txs: Vec<TxEnvelope> },
}

impl P2pMessage {
    /// Serialize to bytes for GossipSub propagation.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProverError> {
        bincode::serialize(self).map_err(|e| ProverError::Serialization(e.to_string()))
    }

    /// Deserialize from GossipSub bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProverError> {
        bincode::deserialize(bytes).map_err(|e| ProverError::Serialization(e.to_string()))
    }
}

/// A message queued for broadcast. `ack` reports whether GossipSub
/// accepted it.
#[derive(Debug)]
pub struct Outbound {
    pub message: P2pMessage,
    pub ack: oneshot::Sender<Result<(), ProverError>>,
}

impl Outbound {
    pub fn with_ack(message: P2pMessage) -> (Self, oneshot::Receiver<Result<(), ProverError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { message, ack: tx }, rx)
    }
}
