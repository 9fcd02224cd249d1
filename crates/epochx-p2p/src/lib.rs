//! epochx-p2p
//!
//! libp2p transport used by the peer-distributed coordination variant.
//!
//! One GossipSub topic carries signed quotes and epoch transaction
//! requests/responses. Peers are found by dialling the configured bootstrap
//! addresses; the mesh spreads from there.

pub mod config;
pub mod message;
pub mod network;

pub use config::P2pConfig;
pub use message::{Outbound, P2pMessage};
pub use network::{P2pHandle, P2pNetwork};
pub use libp2p::{Multiaddr, PeerId};
