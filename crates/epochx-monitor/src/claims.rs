use std::sync::Arc;

use epochx_bond::BondManager;
use epochx_coordination::ProverCoordination;
use epochx_core::error::ProverError;
use epochx_core::types::Slot;
use epochx_core::{
    BondState, ChainClaimStatus, ClaimRecord, ClaimStatus, EpochState, EpochStatus, JobStatus,
    NodeOptions,
};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::book::ClaimBook;
use crate::runner::run_with_shutdown;
use crate::tracker::{ChainReader, EpochTracker};
use crate::traits::{JobBroker, SettlementChain};

/// Follows every unresolved claim to its end, settling the bond behind it.
///
/// Pending claims resolve against the chain's claim status and the quote's
/// validity window. Accepted claims resolve against the chain's proof status
/// and the broker's job status.
pub struct ClaimsMonitor {
    chain: Arc<dyn SettlementChain>,
    broker: Arc<dyn JobBroker>,
    coordination: Arc<dyn ProverCoordination>,
    bonds: Arc<BondManager>,
    claims: Arc<ClaimBook>,
    tracker: Arc<EpochTracker>,
    options: NodeOptions,
}

impl ClaimsMonitor {
    pub fn new(
        chain: Arc<dyn SettlementChain>,
        broker: Arc<dyn JobBroker>,
        coordination: Arc<dyn ProverCoordination>,
        bonds: Arc<BondManager>,
        claims: Arc<ClaimBook>,
        tracker: Arc<EpochTracker>,
        options: NodeOptions,
    ) -> Self {
        Self { chain, broker, coordination, bonds, claims, tracker, options }
    }

    /// One polling round over every Pending and Accepted claim, checked
    /// concurrently. Returns how many claims changed status.
    ///
    /// The round counts once toward chain health: a success only when every
    /// chain read in it succeeded.
    pub async fn tick(&self) -> Result<usize, ProverError> {
        let slot = match self.chain.current_slot().await {
            Ok(slot) => slot,
            Err(e) => {
                self.tracker.record_chain_failure(ChainReader::Claims, &e);
                return Err(e);
            }
        };

        let active = self.claims.active();
        if active.is_empty() {
            self.tracker.record_chain_success(ChainReader::Claims);
            return Ok(0);
        }
        debug!(slot = %slot, active = active.len(), "checking claims");

        let outcomes = join_all(active.into_iter().map(|record| self.check(record, slot))).await;
        let mut changed = 0;
        let mut chain_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "claim check failed");
                    if matches!(e, ProverError::ChainRead(_)) {
                        chain_error.get_or_insert(e);
                    }
                }
            }
        }
        match chain_error {
            Some(e) => self.tracker.record_chain_failure(ChainReader::Claims, &e),
            None => self.tracker.record_chain_success(ChainReader::Claims),
        }
        Ok(changed)
    }

    async fn check(&self, record: ClaimRecord, slot: Slot) -> Result<bool, ProverError> {
        match record.status {
            ClaimStatus::Pending => self.check_pending(record, slot).await,
            ClaimStatus::Accepted => self.check_accepted(record).await,
            _ => Ok(false),
        }
    }

    async fn check_pending(&self, record: ClaimRecord, slot: Slot) -> Result<bool, ProverError> {
        match self.chain.claim_status(record.epoch).await? {
            ChainClaimStatus::Accepted(hash) if hash == record.quote_hash => {
                let mut record = self.resolve(record, ClaimStatus::Accepted, None)?;
                info!(epoch = %record.epoch, hash = %hash, "claim accepted");
                self.start_job(&mut record).await;
                Ok(true)
            }
            ChainClaimStatus::Accepted(other) => {
                debug!(epoch = %record.epoch, winner = %other, "another quote won the epoch");
                self.resolve(record, ClaimStatus::Rejected, Some(BondState::Released))?;
                Ok(true)
            }
            ChainClaimStatus::Rejected => {
                self.resolve(record, ClaimStatus::Rejected, Some(BondState::Released))?;
                Ok(true)
            }
            ChainClaimStatus::None if slot > record.valid_until_slot() => {
                debug!(epoch = %record.epoch, slot = %slot, valid_until = %record.valid_until_slot(), "quote expired");
                self.resolve(record, ClaimStatus::Expired, Some(BondState::Released))?;
                Ok(true)
            }
            ChainClaimStatus::None => Ok(false),
        }
    }

    async fn check_accepted(&self, mut record: ClaimRecord) -> Result<bool, ProverError> {
        if self.chain.epoch_status(record.epoch).await? == EpochStatus::Proven {
            self.resolve(record, ClaimStatus::Delivered, Some(BondState::Released))?;
            return Ok(true);
        }

        let Some(job) = record.job.clone() else {
            self.start_job(&mut record).await;
            return Ok(false);
        };

        match self.broker.job_status(&job).await? {
            JobStatus::Running => Ok(false),
            JobStatus::Delivered => {
                self.resolve(record, ClaimStatus::Delivered, Some(BondState::Released))?;
                Ok(true)
            }
            JobStatus::Failed => {
                warn!(epoch = %record.epoch, job = %job, "proving job failed, forfeiting bond");
                self.resolve(record, ClaimStatus::Forfeited, Some(BondState::Forfeited))?;
                Ok(true)
            }
        }
    }

    /// Settle the bond (when asked), move the claim, persist it and mirror the
    /// new state into the tracker.
    fn resolve(
        &self,
        mut record: ClaimRecord,
        next: ClaimStatus,
        bond: Option<BondState>,
    ) -> Result<ClaimRecord, ProverError> {
        if !record.status.can_transition_to(next) {
            return Err(ProverError::InvalidTransition(format!(
                "claim for epoch {}: {:?} -> {:?}",
                record.epoch, record.status, next
            )));
        }
        if let Some(target) = bond {
            self.bonds.settle(record.reservation, target)?;
        }
        record.transition(next)?;
        self.claims.update(&record)?;

        let state = EpochState::from(next);
        if let Err(e) = self.tracker.set_state(record.epoch, state, None) {
            // The table is observability only; the claim itself is settled.
            debug!(epoch = %record.epoch, error = %e, "tracker out of step, restoring");
            self.tracker.restore(record.epoch, state);
        }
        info!(epoch = %record.epoch, status = ?next, "claim resolved");
        Ok(record)
    }

    /// Fetch the epoch's transactions and hand them to the broker. On failure
    /// the claim stays Accepted without a job and is retried next round.
    async fn start_job(&self, record: &mut ClaimRecord) {
        let txs = match self.coordination.fetch_transactions(record.epoch).await {
            Ok(txs) => txs,
            Err(e) => {
                warn!(epoch = %record.epoch, error = %e, "could not fetch epoch transactions");
                return;
            }
        };
        let count = txs.len();
        match self.broker.submit_proving_job(record.epoch, txs).await {
            Ok(job) => {
                info!(epoch = %record.epoch, job = %job, txs = count, "proving job submitted");
                record.job = Some(job);
                if let Err(e) = self.claims.update(record) {
                    warn!(epoch = %record.epoch, error = %e, "could not persist job handle");
                }
            }
            Err(e) => warn!(epoch = %record.epoch, error = %e, "could not submit proving job"),
        }
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let interval = self.options.polling_interval();
        run_with_shutdown("claims-monitor", shutdown, move || {
            let monitor = self.clone();
            async move {
                if let Err(e) = monitor.tick().await {
                    warn!(error = %e, "claims monitor round failed");
                }
                interval
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use epochx_core::types::{Address, Epoch, JobHandle, TxEnvelope, B256, U256};
    use epochx_core::{QuotePayload, SignedQuote};
    use epochx_crypto::QuoteSigner;

    use crate::epoch::tests::MockChain;
    use crate::tracker::HealthStatus;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[derive(Default)]
    struct MockBroker {
        submitted: Mutex<Vec<(u64, usize)>>,
        status: Mutex<Option<JobStatus>>,
        reject: Mutex<bool>,
    }

    #[async_trait]
    impl JobBroker for MockBroker {
        async fn submit_proving_job(
            &self,
            epoch: Epoch,
            txs: Vec<TxEnvelope>,
        ) -> Result<JobHandle, ProverError> {
            if *self.reject.lock().unwrap() {
                return Err(ProverError::Broker("queue full".into()));
            }
            self.submitted.lock().unwrap().push((epoch.to::<u64>(), txs.len()));
            Ok(JobHandle(format!("job-{epoch}")))
        }

        async fn job_status(&self, _job: &JobHandle) -> Result<JobStatus, ProverError> {
            Ok(self.status.lock().unwrap().unwrap_or(JobStatus::Running))
        }
    }

    #[derive(Default)]
    struct MockCoordination {
        offline: Mutex<bool>,
    }

    #[async_trait]
    impl ProverCoordination for MockCoordination {
        async fn publish(&self, _quote: &SignedQuote) -> Result<(), ProverError> {
            Ok(())
        }

        async fn fetch_transactions(&self, _epoch: Epoch) -> Result<Vec<TxEnvelope>, ProverError> {
            if *self.offline.lock().unwrap() {
                return Err(ProverError::Transport("no peers".into()));
            }
            Ok(vec![TxEnvelope::new(B256::repeat_byte(9), vec![1, 2, 3])])
        }
    }

    struct Fixture {
        chain: Arc<MockChain>,
        broker: Arc<MockBroker>,
        coordination: Arc<MockCoordination>,
        bonds: Arc<BondManager>,
        claims: Arc<ClaimBook>,
        tracker: Arc<EpochTracker>,
        monitor: ClaimsMonitor,
        quote: SignedQuote,
    }

    fn prover(signer: &QuoteSigner) -> Address {
        signer.address()
    }

    /// Epoch 42, bond 1000, fee 250, valid until slot 900, already published.
    fn fixture() -> Fixture {
        let chain = Arc::new(MockChain::at(43));
        let broker = Arc::new(MockBroker::default());
        let coordination = Arc::new(MockCoordination::default());
        let bonds = Arc::new(BondManager::new());
        let claims = Arc::new(ClaimBook::new());
        let tracker = Arc::new(EpochTracker::new(3));

        let signer = QuoteSigner::from_private_key(KEY).unwrap();
        bonds.deposit(prover(&signer), U256::from(1000u64)).unwrap();
        let reservation = bonds
            .reserve(prover(&signer), U256::from(42u64), U256::from(1000u64))
            .unwrap();
        let payload = QuotePayload::new(
            U256::from(42u64),
            U256::from(900u64),
            U256::from(1000u64),
            prover(&signer),
            250,
        )
        .unwrap();
        let quote = signer.sign(payload).unwrap();
        claims.insert(ClaimRecord::new(quote.clone(), reservation.id)).unwrap();
        tracker.set_state(U256::from(42u64), EpochState::Quoting, None).unwrap();
        tracker.set_state(U256::from(42u64), EpochState::Published, None).unwrap();

        let monitor = ClaimsMonitor::new(
            chain.clone(),
            broker.clone(),
            coordination.clone(),
            bonds.clone(),
            claims.clone(),
            tracker.clone(),
            NodeOptions::default(),
        );
        Fixture { chain, broker, coordination, bonds, claims, tracker, monitor, quote }
    }

    impl Fixture {
        fn status(&self) -> ClaimStatus {
            self.claims.get(&U256::from(42u64)).unwrap().status
        }

        fn available(&self) -> U256 {
            self.bonds.available(&self.quote.payload().prover())
        }

        fn set_claim(&self, status: ChainClaimStatus) {
            self.chain.claims.lock().unwrap().insert(42, status);
        }

        fn set_slot(&self, slot: u64) {
            *self.chain.current_slot.lock().unwrap() = slot;
        }
    }

    #[tokio::test]
    async fn unresolved_claim_waits() {
        let f = fixture();
        f.set_slot(900);
        assert_eq!(f.monitor.tick().await.unwrap(), 0);
        assert_eq!(f.status(), ClaimStatus::Pending);
        assert_eq!(f.available(), U256::ZERO);
    }

    #[tokio::test]
    async fn rival_quote_rejects_and_releases() {
        let f = fixture();
        f.set_claim(ChainClaimStatus::Accepted(B256::repeat_byte(0xEE)));
        assert_eq!(f.monitor.tick().await.unwrap(), 1);
        assert_eq!(f.status(), ClaimStatus::Rejected);
        assert_eq!(f.available(), U256::from(1000u64));
        assert_eq!(f.tracker.state(&U256::from(42u64)), Some(EpochState::Rejected));
        assert!(f.broker.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_rejection_releases() {
        let f = fixture();
        f.set_claim(ChainClaimStatus::Rejected);
        f.monitor.tick().await.unwrap();
        assert_eq!(f.status(), ClaimStatus::Rejected);
        assert_eq!(f.available(), U256::from(1000u64));
    }

    #[tokio::test]
    async fn validity_window_expiry_releases() {
        let f = fixture();
        f.set_slot(901);
        assert_eq!(f.monitor.tick().await.unwrap(), 1);
        assert_eq!(f.status(), ClaimStatus::Expired);
        assert_eq!(f.available(), U256::from(1000u64));
        assert_eq!(f.tracker.state(&U256::from(42u64)), Some(EpochState::Expired));
    }

    #[tokio::test]
    async fn accepted_claim_submits_job_then_delivers() {
        let f = fixture();
        f.set_claim(ChainClaimStatus::Accepted(f.quote.quote_hash()));
        assert_eq!(f.monitor.tick().await.unwrap(), 1);
        assert_eq!(f.status(), ClaimStatus::Accepted);
        assert_eq!(*f.broker.submitted.lock().unwrap(), vec![(42, 1)]);
        assert_eq!(f.available(), U256::ZERO);

        // Still running: nothing changes.
        assert_eq!(f.monitor.tick().await.unwrap(), 0);

        *f.broker.status.lock().unwrap() = Some(JobStatus::Delivered);
        assert_eq!(f.monitor.tick().await.unwrap(), 1);
        assert_eq!(f.status(), ClaimStatus::Delivered);
        assert_eq!(f.available(), U256::from(1000u64));
        assert_eq!(f.tracker.state(&U256::from(42u64)), Some(EpochState::Delivered));
        assert_eq!(f.monitor.tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chain_proof_counts_as_delivery() {
        let f = fixture();
        f.set_claim(ChainClaimStatus::Accepted(f.quote.quote_hash()));
        f.monitor.tick().await.unwrap();
        f.chain.set(42, EpochStatus::Proven);
        f.monitor.tick().await.unwrap();
        assert_eq!(f.status(), ClaimStatus::Delivered);
        assert_eq!(f.available(), U256::from(1000u64));
    }

    #[tokio::test]
    async fn failed_job_forfeits_bond() {
        let f = fixture();
        f.set_claim(ChainClaimStatus::Accepted(f.quote.quote_hash()));
        f.monitor.tick().await.unwrap();
        *f.broker.status.lock().unwrap() = Some(JobStatus::Failed);
        assert_eq!(f.monitor.tick().await.unwrap(), 1);
        assert_eq!(f.status(), ClaimStatus::Forfeited);
        let prover = f.quote.payload().prover();
        assert_eq!(f.bonds.balance(&prover), U256::ZERO);
        assert_eq!(f.tracker.state(&U256::from(42u64)), Some(EpochState::Forfeited));
    }

    #[tokio::test]
    async fn job_submission_is_retried() {
        let f = fixture();
        *f.coordination.offline.lock().unwrap() = true;
        f.set_claim(ChainClaimStatus::Accepted(f.quote.quote_hash()));
        f.monitor.tick().await.unwrap();
        assert_eq!(f.status(), ClaimStatus::Accepted);
        assert!(f.claims.get(&U256::from(42u64)).unwrap().job.is_none());

        *f.coordination.offline.lock().unwrap() = false;
        *f.broker.reject.lock().unwrap() = true;
        f.monitor.tick().await.unwrap();
        assert!(f.claims.get(&U256::from(42u64)).unwrap().job.is_none());

        *f.broker.reject.lock().unwrap() = false;
        f.monitor.tick().await.unwrap();
        assert_eq!(
            f.claims.get(&U256::from(42u64)).unwrap().job,
            Some(JobHandle("job-42".into()))
        );
    }

    #[tokio::test]
    async fn persistent_claim_status_failure_degrades_health() {
        let f = fixture();
        *f.chain.claims_down.lock().unwrap() = true;
        for round in 1..=3u32 {
            assert_eq!(f.monitor.tick().await.unwrap(), 0);
            assert_eq!(f.tracker.health().consecutive_chain_failures, round);
        }
        assert_eq!(f.tracker.health().status, HealthStatus::Degraded);
        assert_eq!(f.status(), ClaimStatus::Pending);

        *f.chain.claims_down.lock().unwrap() = false;
        f.monitor.tick().await.unwrap();
        assert_eq!(f.tracker.health().status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn slot_read_failure_counts_against_health() {
        let f = fixture();
        *f.chain.down.lock().unwrap() = true;
        assert!(f.monitor.tick().await.is_err());
        assert_eq!(f.tracker.health().consecutive_chain_failures, 1);
        assert_eq!(f.status(), ClaimStatus::Pending);
    }
}
