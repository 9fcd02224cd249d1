use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use epochx_core::error::ProverError;
use epochx_core::types::{Epoch, TxEnvelope};
use epochx_core::SignedQuote;
use epochx_crypto::verify_signed_quote;
use epochx_p2p::{Outbound, P2pHandle, P2pMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ProverCoordination;

type Waiters = Arc<Mutex<HashMap<Epoch, Vec<oneshot::Sender<Vec<TxEnvelope>>>>>>;

/// Coordination over the libp2p gossip network.
///
/// A background task drains the inbound channel and hands `EpochTxs`
/// answers to whoever is waiting on that epoch.
pub struct P2pCoordination {
    outbound: mpsc::Sender<Outbound>,
    waiters: Waiters,
    request_timeout: Duration,
    dispatcher: JoinHandle<()>,
}

impl P2pCoordination {
    /// Must be called inside a tokio runtime.
    pub fn new(handle: P2pHandle, request_timeout: Duration) -> Self {
        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));
        info!(peer_id = %handle.local_peer_id, "p2p coordination ready");
        let dispatcher = tokio::spawn(dispatch(handle.inbound_rx, waiters.clone()));
        Self { outbound: handle.outbound_tx, waiters, request_timeout, dispatcher }
    }

    async fn broadcast(&self, message: P2pMessage) -> Result<(), ProverError> {
        let (outbound, ack) = Outbound::with_ack(message);
        self.outbound
            .send(outbound)
            .await
            .map_err(|_| ProverError::Publish("p2p network is not running".into()))?;
        ack.await
            .map_err(|_| ProverError::Publish("p2p network dropped the message".into()))?
    }

    fn drop_stale_waiters(&self, epoch: &Epoch) {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = waiters.get_mut(epoch) {
            list.retain(|tx| !tx.is_closed());
            if list.is_empty() {
                waiters.remove(epoch);
            }
        }
    }
}

impl Drop for P2pCoordination {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(mut inbound: mpsc::Receiver<P2pMessage>, waiters: Waiters) {
    while let Some(msg) = inbound.recv().await {
        match msg {
            P2pMessage::EpochTxs { epoch, txs } => {
                let pending = waiters
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&epoch)
                    .unwrap_or_default();
                if pending.is_empty() {
                    debug!(epoch = %epoch, "unsolicited epoch transactions");
                    continue;
                }
                debug!(epoch = %epoch, txs = txs.len(), waiters = pending.len(), "epoch transactions received");
                for tx in pending {
                    let _ = tx.send(txs.clone());
                }
            }
            P2pMessage::EpochProofQuote { payload } => {
                debug!(bytes = payload.len(), "peer quote observed");
            }
            P2pMessage::RequestEpochTxs { epoch } => {
                debug!(epoch = %epoch, "ignoring peer transaction request");
            }
        }
    }
    debug!("p2p inbound channel closed");
}

#[async_trait]
impl ProverCoordination for P2pCoordination {
    async fn publish(&self, quote: &SignedQuote) -> Result<(), ProverError> {
        verify_signed_quote(quote)?;
        self.broadcast(P2pMessage::EpochProofQuote { payload: quote.to_bytes() })
            .await?;
        info!(epoch = %quote.epoch(), hash = %quote.quote_hash(), "quote gossiped");
        Ok(())
    }

    async fn fetch_transactions(&self, epoch: Epoch) -> Result<Vec<TxEnvelope>, ProverError> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(epoch)
            .or_default()
            .push(tx);

        if let Err(e) = self.broadcast(P2pMessage::RequestEpochTxs { epoch }).await {
            self.drop_stale_waiters(&epoch);
            return Err(ProverError::Transport(e.to_string()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(txs)) => Ok(txs),
            Ok(Err(_)) => Err(ProverError::Transport("p2p dispatcher stopped".into())),
            Err(_) => {
                // The receiver went down with the timeout future.
                self.drop_stale_waiters(&epoch);
                warn!(epoch = %epoch, timeout = ?self.request_timeout, "no peer answered transaction request");
                Err(ProverError::Transport(format!(
                    "no peer answered for epoch {epoch} within {:?}",
                    self.request_timeout
                )))
            }
        }
    }
}
