//! epochx-node
//!
//! The prover node: it watches the settlement chain for claimable epochs,
//! publishes bonded proof quotes for them and follows each quote until the
//! bond behind it is released or forfeited.
//!
//! `ProverNode` wires the pieces together. Remote collaborators (log indexer,
//! job broker, pricing service) are reached over JSON-RPC / HTTP; tests swap
//! them for in-memory mocks through `Collaborators`.

pub mod clients;
pub mod config;
pub mod node;
pub mod quote_provider;
pub mod status;

pub use clients::{RpcJobBroker, RpcSettlementChain};
pub use config::{create_quote_provider, ProverNodeConfig, QuoteProviderConfig};
pub use node::{Collaborators, ProverNode};
pub use quote_provider::{HttpQuoteProvider, QuoteProvider, QuoteTerms, SimpleQuoteProvider};
pub use status::StatusServer;
