use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use epochx_coordination::CoordinationConfig;
use epochx_core::types::{BondAmount, U256};
use epochx_core::NodeOptions;
use tracing::info;
use zeroize::Zeroizing;

use crate::quote_provider::{HttpQuoteProvider, QuoteProvider, SimpleQuoteProvider};

/// Where quote terms come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteProviderConfig {
    Fixed { basis_point_fee: i64, bond_amount: BondAmount },
    Http { url: String },
}

pub fn create_quote_provider(config: &QuoteProviderConfig) -> Arc<dyn QuoteProvider> {
    match config {
        QuoteProviderConfig::Fixed { basis_point_fee, bond_amount } => {
            info!(fee = basis_point_fee, bond = %bond_amount, "using fixed quote terms");
            Arc::new(SimpleQuoteProvider::new(*basis_point_fee, *bond_amount))
        }
        QuoteProviderConfig::Http { url } => {
            info!(url = %url, "using http quote provider");
            Arc::new(HttpQuoteProvider::new(url))
        }
    }
}

/// Everything a prover node needs, fixed at startup.
#[derive(Clone)]
pub struct ProverNodeConfig {
    /// Persistent state directory. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// secp256k1 key, 0x-hex. Wiped on drop.
    pub private_key: Zeroizing<String>,
    pub indexer_url: String,
    pub broker_url: String,
    pub coordination: CoordinationConfig,
    pub quote_provider: QuoteProviderConfig,
    /// Credited to the prover on a fresh ledger.
    pub initial_deposit: BondAmount,
    /// Status JSON-RPC server address, if enabled.
    pub status_addr: Option<SocketAddr>,
    pub options: NodeOptions,
}

impl ProverNodeConfig {
    /// Config with fixed zero-fee terms and in-memory state.
    pub fn new(
        private_key: impl Into<String>,
        indexer_url: impl Into<String>,
        broker_url: impl Into<String>,
        coordination: CoordinationConfig,
    ) -> Self {
        Self {
            data_dir: None,
            private_key: Zeroizing::new(private_key.into()),
            indexer_url: indexer_url.into(),
            broker_url: broker_url.into(),
            coordination,
            quote_provider: QuoteProviderConfig::Fixed {
                basis_point_fee: 0,
                bond_amount: U256::ZERO,
            },
            initial_deposit: U256::ZERO,
            status_addr: None,
            options: NodeOptions::default(),
        }
    }
}

impl fmt::Debug for ProverNodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProverNodeConfig")
            .field("data_dir", &self.data_dir)
            .field("private_key", &"<redacted>")
            .field("indexer_url", &self.indexer_url)
            .field("broker_url", &self.broker_url)
            .field("coordination", &self.coordination)
            .field("quote_provider", &self.quote_provider)
            .field("initial_deposit", &self.initial_deposit)
            .field("status_addr", &self.status_addr)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_key() {
        let config = ProverNodeConfig::new(
            "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef",
            "http://indexer",
            "http://broker",
            CoordinationConfig::Direct { node_url: "http://node".into() },
        );
        let shown = format!("{config:?}");
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("deadbeef"));
    }
}
