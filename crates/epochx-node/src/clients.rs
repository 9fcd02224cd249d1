use async_trait::async_trait;
use epochx_core::error::ProverError;
use epochx_core::types::{Epoch, JobHandle, Slot, TxEnvelope, B256};
use epochx_core::{ChainClaimStatus, EpochStatus, JobStatus};
use epochx_monitor::{JobBroker, SettlementChain};
use epochx_rpc::{u256_from_json, u256_to_json, JsonRpcClient};
use serde::Deserialize;
use serde_json::{json, Value};

/// Settlement-chain reads through the log indexer's JSON-RPC API.
///
///   indexer_currentEpoch()      → integer
///   indexer_currentSlot()       → integer
///   indexer_epochStatus(epoch)  → "unproven" | "proven" | "claimable"
///   indexer_claimStatus(epoch)  → {"status": "none"|"accepted"|"rejected", "quoteHash"?: 0x..}
pub struct RpcSettlementChain {
    client: JsonRpcClient,
}

impl RpcSettlementChain {
    pub fn new(url: &str) -> Self {
        Self { client: JsonRpcClient::new(url) }
    }

    async fn integer(&self, method: &str) -> Result<Epoch, ProverError> {
        let value = self
            .client
            .call_value(method, json!([]))
            .await
            .map_err(|e| ProverError::ChainRead(e.to_string()))?;
        u256_from_json(&value)
            .ok_or_else(|| ProverError::ChainRead(format!("{method}: not an integer: {value}")))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcClaimStatus {
    status: String,
    quote_hash: Option<B256>,
}

pub fn parse_epoch_status(s: &str) -> Result<EpochStatus, ProverError> {
    match s {
        "unproven" => Ok(EpochStatus::Unproven),
        "proven" => Ok(EpochStatus::Proven),
        "claimable" => Ok(EpochStatus::Claimable),
        other => Err(ProverError::ChainRead(format!("unknown epoch status {other:?}"))),
    }
}

fn parse_claim_status(raw: RpcClaimStatus) -> Result<ChainClaimStatus, ProverError> {
    match (raw.status.as_str(), raw.quote_hash) {
        ("none", _) => Ok(ChainClaimStatus::None),
        ("rejected", _) => Ok(ChainClaimStatus::Rejected),
        ("accepted", Some(hash)) => Ok(ChainClaimStatus::Accepted(hash)),
        ("accepted", None) => Err(ProverError::ChainRead("accepted claim without quoteHash".into())),
        (other, _) => Err(ProverError::ChainRead(format!("unknown claim status {other:?}"))),
    }
}

#[async_trait]
impl SettlementChain for RpcSettlementChain {
    async fn current_epoch(&self) -> Result<Epoch, ProverError> {
        self.integer("indexer_currentEpoch").await
    }

    async fn current_slot(&self) -> Result<Slot, ProverError> {
        self.integer("indexer_currentSlot").await
    }

    async fn epoch_status(&self, epoch: Epoch) -> Result<EpochStatus, ProverError> {
        let s: String = self
            .client
            .call("indexer_epochStatus", json!([u256_to_json(epoch)]))
            .await
            .map_err(|e| ProverError::ChainRead(e.to_string()))?;
        parse_epoch_status(&s)
    }

    async fn claim_status(&self, epoch: Epoch) -> Result<ChainClaimStatus, ProverError> {
        let raw: RpcClaimStatus = self
            .client
            .call("indexer_claimStatus", json!([u256_to_json(epoch)]))
            .await
            .map_err(|e| ProverError::ChainRead(e.to_string()))?;
        parse_claim_status(raw)
    }
}

/// Proving pipeline behind the job broker's JSON-RPC API.
///
///   broker_submitProvingJob(epoch, [{hash, data}]) → job id string
///   broker_getJobStatus(job id)                    → "running" | "delivered" | "failed"
pub struct RpcJobBroker {
    client: JsonRpcClient,
}

impl RpcJobBroker {
    pub fn new(url: &str) -> Self {
        Self { client: JsonRpcClient::new(url) }
    }
}

fn broker(e: impl std::fmt::Display) -> ProverError {
    ProverError::Broker(e.to_string())
}

#[async_trait]
impl JobBroker for RpcJobBroker {
    async fn submit_proving_job(
        &self,
        epoch: Epoch,
        txs: Vec<TxEnvelope>,
    ) -> Result<JobHandle, ProverError> {
        let txs: Vec<Value> = txs
            .iter()
            .map(|tx| json!({ "hash": tx.hash, "data": format!("0x{}", hex::encode(&tx.data)) }))
            .collect();
        let id: String = self
            .client
            .call("broker_submitProvingJob", json!([u256_to_json(epoch), txs]))
            .await
            .map_err(broker)?;
        Ok(JobHandle(id))
    }

    async fn job_status(&self, job: &JobHandle) -> Result<JobStatus, ProverError> {
        let s: String = self
            .client
            .call("broker_getJobStatus", json!([job.0]))
            .await
            .map_err(broker)?;
        match s.as_str() {
            "running" => Ok(JobStatus::Running),
            "delivered" => Ok(JobStatus::Delivered),
            "failed" => Ok(JobStatus::Failed),
            other => Err(broker(format!("unknown job status {other:?}"))),
        }
    }
}
