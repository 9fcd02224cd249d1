//! epochx-coordination
//!
//! How a signed quote leaves the node and how the node obtains an epoch's
//! transactions once its claim is accepted. Two variants:
//!
//! - `P2pCoordination` — gossip over the libp2p quote topic.
//! - `DirectCoordination` — JSON-RPC to a single trusted node.
//!
//! Both refuse to publish a quote whose signature does not recover to the
//! payload's prover.

pub mod config;
pub mod direct;
pub mod p2p;

use async_trait::async_trait;
use epochx_core::error::ProverError;
use epochx_core::types::{Epoch, TxEnvelope};
use epochx_core::SignedQuote;

pub use config::{create_prover_coordination, CoordinationConfig};
pub use direct::DirectCoordination;
pub use p2p::P2pCoordination;

/// Outbound quote distribution and transaction retrieval.
#[async_trait]
pub trait ProverCoordination: Send + Sync {
    /// Distribute a signed quote. Fails with `SignatureMismatch` before
    /// anything is sent when the signature does not match the prover.
    async fn publish(&self, quote: &SignedQuote) -> Result<(), ProverError>;

    /// Transactions of `epoch`, in block order.
    async fn fetch_transactions(&self, epoch: Epoch) -> Result<Vec<TxEnvelope>, ProverError>;
}
