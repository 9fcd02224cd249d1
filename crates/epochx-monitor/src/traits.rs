use async_trait::async_trait;
use epochx_core::error::ProverError;
use epochx_core::types::{Epoch, JobHandle, Slot, TxEnvelope};
use epochx_core::{ChainClaimStatus, EpochStatus, JobStatus};

/// Read access to the settlement chain (through its log indexer).
#[async_trait]
pub trait SettlementChain: Send + Sync {
    /// The epoch currently in progress; every lower epoch is complete.
    async fn current_epoch(&self) -> Result<Epoch, ProverError>;

    async fn current_slot(&self) -> Result<Slot, ProverError>;

    async fn epoch_status(&self, epoch: Epoch) -> Result<EpochStatus, ProverError>;

    async fn claim_status(&self, epoch: Epoch) -> Result<ChainClaimStatus, ProverError>;
}

/// The downstream proving pipeline.
#[async_trait]
pub trait JobBroker: Send + Sync {
    async fn submit_proving_job(
        &self,
        epoch: Epoch,
        txs: Vec<TxEnvelope>,
    ) -> Result<JobHandle, ProverError>;

    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus, ProverError>;
}

/// Called by the epoch monitor for each claimable epoch, in order. `Ok`
/// means a quote was published and a Pending claim recorded.
#[async_trait]
pub trait EpochHandler: Send + Sync {
    async fn handle_epoch_completed(&self, epoch: Epoch) -> Result<(), ProverError>;
}
