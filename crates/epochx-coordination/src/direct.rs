use async_trait::async_trait;
use epochx_core::error::ProverError;
use epochx_core::types::{Epoch, TxEnvelope, B256};
use epochx_core::SignedQuote;
use epochx_crypto::verify_signed_quote;
use epochx_rpc::JsonRpcClient;
use serde::Deserialize;
use tracing::{debug, info};

use crate::ProverCoordination;

/// Transaction as returned by `node_getEpochTransactions`.
#[derive(Debug, Deserialize)]
struct RpcTx {
    hash: B256,
    /// 0x-prefixed hex.
    data: String,
}

impl TryFrom<RpcTx> for TxEnvelope {
    type Error = ProverError;

    fn try_from(tx: RpcTx) -> Result<Self, Self::Error> {
        let data = hex::decode(tx.data.trim_start_matches("0x"))
            .map_err(|e| ProverError::Transport(format!("tx {} data is not hex: {e}", tx.hash)))?;
        Ok(TxEnvelope::new(tx.hash, data))
    }
}

/// Coordination through one trusted node's JSON-RPC endpoint.
pub struct DirectCoordination {
    client: JsonRpcClient,
}

impl DirectCoordination {
    pub fn new(node_url: &str) -> Self {
        Self { client: JsonRpcClient::new(node_url) }
    }

    pub fn with_client(client: JsonRpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProverCoordination for DirectCoordination {
    async fn publish(&self, quote: &SignedQuote) -> Result<(), ProverError> {
        verify_signed_quote(quote)?;
        let quote_hex = format!("0x{}", hex::encode(quote.to_bytes()));
        self.client
            .call_value("node_sendEpochProofQuote", serde_json::json!([quote_hex]))
            .await
            .map_err(|e| ProverError::Publish(e.to_string()))?;
        info!(epoch = %quote.epoch(), node = %self.client.url(), "quote sent to node");
        Ok(())
    }

    async fn fetch_transactions(&self, epoch: Epoch) -> Result<Vec<TxEnvelope>, ProverError> {
        let txs: Vec<RpcTx> = self
            .client
            .call("node_getEpochTransactions", serde_json::json!([epoch.to_string()]))
            .await
            .map_err(|e| ProverError::Transport(e.to_string()))?;
        debug!(epoch = %epoch, txs = txs.len(), "fetched epoch transactions");
        txs.into_iter().map(TxEnvelope::try_from).collect()
    }
}
