use std::sync::Arc;

use epochx_core::error::ProverError;
use epochx_core::types::{Epoch, U256};
use epochx_core::{EpochState, EpochStatus, NodeOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::book::ClaimBook;
use crate::runner::run_with_shutdown;
use crate::tracker::{ChainReader, EpochTracker};
use crate::traits::{EpochHandler, SettlementChain};

/// Walks completed epochs above the progress cursor, oldest first, and hands
/// each claimable one to the handler exactly once.
pub struct EpochMonitor {
    chain: Arc<dyn SettlementChain>,
    handler: Arc<dyn EpochHandler>,
    tracker: Arc<EpochTracker>,
    claims: Arc<ClaimBook>,
    options: NodeOptions,
}

impl EpochMonitor {
    pub fn new(
        chain: Arc<dyn SettlementChain>,
        handler: Arc<dyn EpochHandler>,
        tracker: Arc<EpochTracker>,
        claims: Arc<ClaimBook>,
        options: NodeOptions,
    ) -> Self {
        Self { chain, handler, tracker, claims, options }
    }

    fn at_capacity(&self) -> bool {
        let in_flight = self.claims.in_flight_count();
        let pending = self.claims.pending_count();
        let full = in_flight >= self.options.max_parallel_blocks_per_epoch
            || pending >= self.options.max_pending_jobs;
        if full {
            debug!(
                in_flight,
                pending,
                max_parallel = self.options.max_parallel_blocks_per_epoch,
                max_pending = self.options.max_pending_jobs,
                "at capacity, not quoting"
            );
        }
        full
    }

    async fn read<T>(
        &self,
        read: impl std::future::Future<Output = Result<T, ProverError>>,
    ) -> Result<T, ProverError> {
        match read.await {
            Ok(v) => {
                self.tracker.record_chain_success(ChainReader::Epochs);
                Ok(v)
            }
            Err(e) => {
                self.tracker.record_chain_failure(ChainReader::Epochs, &e);
                Err(e)
            }
        }
    }

    /// One polling round. Returns how many epochs were decided (quoted or
    /// skipped) and therefore passed by the cursor.
    pub async fn tick(&self) -> Result<usize, ProverError> {
        let current = self.read(self.chain.current_epoch()).await?;
        if current.is_zero() {
            return Ok(0);
        }
        let latest_completed = current - U256::from(1u64);

        let mut next = match self.tracker.cursor() {
            Some(cursor) => cursor + U256::from(1u64),
            None => {
                // First start: begin at the most recently completed epoch.
                if !latest_completed.is_zero() {
                    self.tracker.advance_cursor(latest_completed - U256::from(1u64))?;
                }
                latest_completed
            }
        };

        let mut decided = 0;
        while next < current {
            let epoch = next;
            if self.already_decided(&epoch) {
                debug!(epoch = %epoch, "epoch already decided, passing it");
            } else {
                if self.at_capacity() {
                    break;
                }
                match self.read(self.chain.epoch_status(epoch)).await? {
                    EpochStatus::Proven => self.mark(epoch, EpochState::Skipped, Some("already proven")),
                    EpochStatus::Unproven if epoch == latest_completed => {
                        debug!(epoch = %epoch, "latest epoch not claimable yet");
                        break;
                    }
                    EpochStatus::Unproven => {
                        self.mark(epoch, EpochState::Skipped, Some("claim window missed"))
                    }
                    EpochStatus::Claimable => self.quote(epoch).await,
                }
            }
            self.tracker.advance_cursor(epoch)?;
            decided += 1;
            next = epoch + U256::from(1u64);
        }
        Ok(decided)
    }

    /// An epoch with a claim record or a tracked state was handled before,
    /// possibly by a run that stopped before the cursor caught up.
    fn already_decided(&self, epoch: &Epoch) -> bool {
        self.claims.get(epoch).is_some()
            || self.tracker.state(epoch).is_some_and(|s| s != EpochState::Unconsidered)
    }

    /// Record `state` for `epoch`. A refused transition means the claims
    /// monitor already moved the epoch further; its state stands.
    fn mark(&self, epoch: Epoch, state: EpochState, reason: Option<&str>) {
        if let Err(e) = self.tracker.set_state(epoch, state, reason.map(str::to_string)) {
            debug!(epoch = %epoch, to = %state, error = %e, "epoch state left as is");
        }
    }

    async fn quote(&self, epoch: Epoch) {
        self.mark(epoch, EpochState::Quoting, None);
        match self.handler.handle_epoch_completed(epoch).await {
            Ok(()) => {
                self.mark(epoch, EpochState::Published, None);
                info!(epoch = %epoch, "quote published");
            }
            Err(e) => {
                warn!(epoch = %epoch, error = %e, recoverable = e.is_recoverable(), "quoting failed, skipping epoch");
                let reason = format!("quote failed: {e}");
                self.mark(epoch, EpochState::Skipped, Some(&reason));
            }
        }
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let interval = self.options.polling_interval();
        run_with_shutdown("epoch-monitor", shutdown, move || {
            let monitor = self.clone();
            async move {
                if let Err(e) = monitor.tick().await {
                    warn!(error = %e, "epoch monitor round failed");
                }
                interval
            }
        })
        .await;
    }
}
