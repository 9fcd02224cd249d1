use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use epochx_bond::BondManager;
use epochx_coordination::{create_prover_coordination, ProverCoordination};
use epochx_core::error::ProverError;
use epochx_core::types::{Address, BondAmount, Epoch, U256};
use epochx_core::{BondReservation, ClaimRecord, NodeOptions, QuotePayload, SignedQuote, TrackedEpoch};
use epochx_crypto::QuoteSigner;
use epochx_monitor::{
    ClaimBook, ClaimsMonitor, EpochHandler, EpochMonitor, EpochTracker, HealthReport, JobBroker,
    SettlementChain,
};
use epochx_state::StateDb;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clients::{RpcJobBroker, RpcSettlementChain};
use crate::config::{create_quote_provider, ProverNodeConfig};
use crate::quote_provider::{QuoteProvider, QuoteTerms};

/// The outside world a prover node talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn SettlementChain>,
    pub broker: Arc<dyn JobBroker>,
    pub coordination: Arc<dyn ProverCoordination>,
    pub provider: Arc<dyn QuoteProvider>,
}

// ── QuoteIssuer ──────────────────────────────────────────────────────────────

/// Turns a claimable epoch into a published, bonded quote.
///
/// Terms → reserve → build payload → sign → Pending claim → publish. The
/// claim is written before the quote leaves the node, so a published quote
/// always has a record behind it. Any failure before publish succeeds
/// withdraws the claim and releases the bond before the error returns.
pub struct QuoteIssuer {
    chain: Arc<dyn SettlementChain>,
    coordination: Arc<dyn ProverCoordination>,
    provider: Arc<dyn QuoteProvider>,
    signer: QuoteSigner,
    bonds: Arc<BondManager>,
    claims: Arc<ClaimBook>,
    options: NodeOptions,
}

impl QuoteIssuer {
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub async fn issue(&self, epoch: Epoch) -> Result<SignedQuote, ProverError> {
        let terms = self.provider.get_terms(epoch).await?;
        let reservation = self.bonds.reserve(self.address(), epoch, terms.bond_amount)?;
        match self.publish_bonded(epoch, &terms, &reservation).await {
            Ok(quote) => Ok(quote),
            Err(e) => {
                if let Err(release) = self.bonds.release(&reservation) {
                    warn!(epoch = %epoch, reservation = %reservation.id, error = %release, "could not release bond");
                }
                Err(e)
            }
        }
    }

    async fn publish_bonded(
        &self,
        epoch: Epoch,
        terms: &QuoteTerms,
        reservation: &BondReservation,
    ) -> Result<SignedQuote, ProverError> {
        let valid_until_slot = match terms.valid_until_slot {
            Some(slot) => slot,
            None => {
                let slot = self.chain.current_slot().await?;
                slot.saturating_add(U256::from(self.options.quote_validity_slots))
            }
        };
        let payload = QuotePayload::new(
            epoch,
            valid_until_slot,
            terms.bond_amount,
            self.address(),
            terms.basis_point_fee,
        )?;
        let quote = self.signer.sign(payload)?;
        let previous = self.claims.get(&epoch);
        self.claims.insert(ClaimRecord::new(quote.clone(), reservation.id))?;
        if let Err(e) = self.coordination.publish(&quote).await {
            if let Err(withdraw) = self.claims.withdraw(&epoch, previous) {
                warn!(epoch = %epoch, error = %withdraw, "could not withdraw unpublished claim");
            }
            return Err(e);
        }
        debug!(
            epoch = %epoch,
            quote = %quote.quote_hash(),
            valid_until = %valid_until_slot,
            "claim published"
        );
        Ok(quote)
    }
}

#[async_trait]
impl EpochHandler for QuoteIssuer {
    async fn handle_epoch_completed(&self, epoch: Epoch) -> Result<(), ProverError> {
        self.issue(epoch).await.map(|_| ())
    }
}

// ── ProverNode ───────────────────────────────────────────────────────────────

struct Running {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// A prover node: the quote issuer, both monitors and the state they share.
pub struct ProverNode {
    issuer: Arc<QuoteIssuer>,
    epoch_monitor: Arc<EpochMonitor>,
    claims_monitor: Arc<ClaimsMonitor>,
    tracker: Arc<EpochTracker>,
    bonds: Arc<BondManager>,
    claims: Arc<ClaimBook>,
    store: Option<Arc<StateDb>>,
    running: Mutex<Option<Running>>,
}

impl ProverNode {
    /// Node whose state lives only in memory.
    pub fn new(collaborators: Collaborators, signer: QuoteSigner, options: NodeOptions) -> Self {
        let tracker = Arc::new(EpochTracker::new(options.chain_failure_threshold));
        Self::assemble(
            collaborators,
            signer,
            Arc::new(BondManager::new()),
            Arc::new(ClaimBook::new()),
            tracker,
            None,
            options,
        )
    }

    /// Node whose cursor, bond ledger and claims are persisted in `store`
    /// and restored from it.
    pub fn with_store(
        collaborators: Collaborators,
        signer: QuoteSigner,
        store: Arc<StateDb>,
        options: NodeOptions,
    ) -> Result<Self, ProverError> {
        let bonds = Arc::new(BondManager::open(store.clone())?);
        let claims = Arc::new(ClaimBook::open(store.clone())?);
        let tracker = Arc::new(EpochTracker::open(store.clone(), options.chain_failure_threshold)?);
        Ok(Self::assemble(collaborators, signer, bonds, claims, tracker, Some(store), options))
    }

    /// Build a node with remote collaborators from `config`. Spawns the
    /// coordination transport, so it must run inside a tokio runtime.
    pub fn from_config(config: &ProverNodeConfig) -> Result<Self, ProverError> {
        let signer = QuoteSigner::from_private_key(&config.private_key)?;
        let collaborators = Collaborators {
            chain: Arc::new(RpcSettlementChain::new(&config.indexer_url)),
            broker: Arc::new(RpcJobBroker::new(&config.broker_url)),
            coordination: create_prover_coordination(&config.coordination)?,
            provider: create_quote_provider(&config.quote_provider),
        };
        let node = match &config.data_dir {
            Some(dir) => {
                let store = Arc::new(StateDb::open(dir)?);
                Self::with_store(collaborators, signer, store, config.options.clone())?
            }
            None => Self::new(collaborators, signer, config.options.clone()),
        };
        node.apply_initial_deposit(config.initial_deposit)?;
        Ok(node)
    }

    fn assemble(
        collaborators: Collaborators,
        signer: QuoteSigner,
        bonds: Arc<BondManager>,
        claims: Arc<ClaimBook>,
        tracker: Arc<EpochTracker>,
        store: Option<Arc<StateDb>>,
        options: NodeOptions,
    ) -> Self {
        let Collaborators { chain, broker, coordination, provider } = collaborators;
        let issuer = Arc::new(QuoteIssuer {
            chain: chain.clone(),
            coordination: coordination.clone(),
            provider,
            signer,
            bonds: bonds.clone(),
            claims: claims.clone(),
            options: options.clone(),
        });
        let epoch_monitor = Arc::new(EpochMonitor::new(
            chain.clone(),
            issuer.clone(),
            tracker.clone(),
            claims.clone(),
            options.clone(),
        ));
        let claims_monitor = Arc::new(ClaimsMonitor::new(
            chain,
            broker,
            coordination,
            bonds.clone(),
            claims.clone(),
            tracker.clone(),
            options,
        ));
        Self {
            issuer,
            epoch_monitor,
            claims_monitor,
            tracker,
            bonds,
            claims,
            store,
            running: Mutex::new(None),
        }
    }

    // ── Bond ─────────────────────────────────────────────────────────────────

    /// Credit `amount` to this node's prover. Returns the new balance.
    pub fn deposit(&self, amount: BondAmount) -> Result<BondAmount, ProverError> {
        self.bonds.deposit(self.address(), amount)
    }

    /// Credit `amount` only if the ledger has never seen this prover, so a
    /// restart does not deposit twice. Returns whether it was applied.
    pub fn apply_initial_deposit(&self, amount: BondAmount) -> Result<bool, ProverError> {
        if amount.is_zero() {
            return Ok(false);
        }
        let prover = self.address();
        let snapshot = self.bonds.snapshot();
        if snapshot.deposits.contains_key(&prover)
            || snapshot.reservations.iter().any(|r| r.prover == prover)
        {
            debug!(prover = %prover, "ledger already funded, initial deposit skipped");
            return Ok(false);
        }
        self.deposit(amount)?;
        Ok(true)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Rebuild the epoch table from the claim records, bring the cursor up
    /// to the newest claimed epoch and spawn both monitors. Calling it on a
    /// running node does nothing.
    pub fn start(&self) -> Result<(), ProverError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Ok(());
        }
        for record in self.claims.all() {
            self.tracker.restore(record.epoch, record.status.into());
        }
        if let Some(newest) = self.claims.newest_epoch() {
            self.tracker.advance_cursor(newest)?;
        }
        let shutdown = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(self.epoch_monitor.clone().run(shutdown.child_token())),
            tokio::spawn(self.claims_monitor.clone().run(shutdown.child_token())),
        ];
        info!(
            prover = %self.address(),
            cursor = ?self.tracker.cursor().map(|c| c.to_string()),
            active_claims = self.claims.active().len(),
            "prover node started"
        );
        *running = Some(Running { shutdown, tasks });
        Ok(())
    }

    /// Cancel both monitors, wait for them to finish their round and flush
    /// the store. Reserved bonds and unresolved claims stay as they are.
    pub async fn stop(&self) -> Result<(), ProverError> {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Running { shutdown, tasks }) = running {
            shutdown.cancel();
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "monitor task ended abnormally");
                }
            }
        }
        if let Some(store) = &self.store {
            store.flush()?;
        }
        info!(
            outstanding_bonds = self.bonds.outstanding().len(),
            active_claims = self.claims.active().len(),
            "prover node stopped"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// One epoch-monitor round, outside the timer.
    pub async fn poll_epochs(&self) -> Result<usize, ProverError> {
        self.epoch_monitor.tick().await
    }

    /// One claims-monitor round, outside the timer.
    pub async fn poll_claims(&self) -> Result<usize, ProverError> {
        self.claims_monitor.tick().await
    }

    // ── Observability ────────────────────────────────────────────────────────

    pub fn states(&self) -> Vec<TrackedEpoch> {
        self.tracker.states()
    }

    pub fn health(&self) -> HealthReport {
        self.tracker.health()
    }

    pub fn address(&self) -> Address {
        self.issuer.address()
    }

    pub fn bonds(&self) -> &Arc<BondManager> {
        &self.bonds
    }

    pub fn claims(&self) -> &Arc<ClaimBook> {
        &self.claims
    }
}

#[async_trait]
impl EpochHandler for ProverNode {
    async fn handle_epoch_completed(&self, epoch: Epoch) -> Result<(), ProverError> {
        self.issuer.handle_epoch_completed(epoch).await
    }
}
