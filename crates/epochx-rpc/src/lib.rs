//! epochx-rpc
//!
//! JSON-RPC plumbing for the prover node.
//!
//! `client` — JSON-RPC 2.0 over HTTP, shared by every remote collaborator
//! (settlement-chain indexer, job broker, trusted coordination node).
//!
//! `api` — the node's own status API. Namespace: "epochx"
//! Methods:
//!   epochx_getEpochStates     — per-epoch lifecycle table
//!   epochx_getHealth          — Healthy / Degraded plus chain-read counters
//!   epochx_getBond            — deposit, available balance, open reservations
//!   epochx_getProverAddress   — address quotes are signed for

pub mod api;
pub mod client;
pub mod types;

pub use api::EpochxApiServer;
pub use client::{u256_from_json, u256_to_json, ClientError, JsonRpcClient};
pub use types::{RpcBond, RpcEpochState, RpcHealth, RpcReservation};
