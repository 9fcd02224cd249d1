use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use epochx_core::error::ProverError;
use epochx_core::types::{Address, BondAmount, Epoch, ReservationId, U256};
use epochx_core::{BondReservation, BondState};
use epochx_state::StateDb;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ── Ledger ───────────────────────────────────────────────────────────────────

/// Reserved totals and the open (prover, epoch) index are kept in step with
/// `reservations` so a reserve never walks the settled history.
#[derive(Default)]
struct Ledger {
    deposits: BTreeMap<Address, BondAmount>,
    reservations: BTreeMap<ReservationId, BondReservation>,
    reserved: BTreeMap<Address, BondAmount>,
    open: BTreeMap<(Address, Epoch), ReservationId>,
    next_id: u64,
}

impl Ledger {
    fn balance(&self, prover: &Address) -> BondAmount {
        self.deposits.get(prover).copied().unwrap_or(U256::ZERO)
    }

    fn reserved_total(&self, prover: &Address) -> BondAmount {
        self.reserved.get(prover).copied().unwrap_or(U256::ZERO)
    }

    fn available(&self, prover: &Address) -> BondAmount {
        self.balance(prover).saturating_sub(self.reserved_total(prover))
    }

    /// Insert or overwrite a reservation, moving the totals with it.
    fn put(&mut self, reservation: BondReservation) {
        if let Some(old) = self.reservations.remove(&reservation.id) {
            self.unindex(&old);
        }
        if reservation.state == BondState::Reserved {
            let total = self.reserved_total(&reservation.prover).saturating_add(reservation.amount);
            self.reserved.insert(reservation.prover, total);
            self.open.insert((reservation.prover, reservation.epoch), reservation.id);
        }
        self.reservations.insert(reservation.id, reservation);
    }

    fn unindex(&mut self, reservation: &BondReservation) {
        if reservation.state != BondState::Reserved {
            return;
        }
        let total = self.reserved_total(&reservation.prover).saturating_sub(reservation.amount);
        if total.is_zero() {
            self.reserved.remove(&reservation.prover);
        } else {
            self.reserved.insert(reservation.prover, total);
        }
        self.open.remove(&(reservation.prover, reservation.epoch));
    }
}

/// Point-in-time copy of the whole ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub deposits: BTreeMap<Address, BondAmount>,
    pub reservations: Vec<BondReservation>,
    pub next_id: u64,
}

// ── BondManager ──────────────────────────────────────────────────────────────

/// Single writer over the bond ledger.
///
/// Every operation takes the one ledger lock, checks, persists (when a store
/// is attached) and only then mutates memory, so a failed write leaves the
/// in-memory ledger untouched.
pub struct BondManager {
    ledger: Mutex<Ledger>,
    store: Option<Arc<StateDb>>,
}

impl Default for BondManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BondManager {
    /// In-memory ledger with no persistence.
    pub fn new() -> Self {
        Self { ledger: Mutex::new(Ledger::default()), store: None }
    }

    /// Ledger backed by `store`, loaded from whatever it already holds.
    pub fn open(store: Arc<StateDb>) -> Result<Self, ProverError> {
        let snapshot = LedgerSnapshot {
            deposits: store.deposits()?.into_iter().collect(),
            reservations: store.reservations()?,
            next_id: store.get_next_reservation_id()?.unwrap_or(0),
        };
        let manager = Self { ledger: Mutex::new(Ledger::default()), store: Some(store) };
        manager.load(snapshot);
        let outstanding = manager.outstanding().len();
        if outstanding > 0 {
            info!(outstanding, "restored bond reservations");
        }
        Ok(manager)
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, snapshot: LedgerSnapshot) {
        let mut ledger = self.ledger();
        *ledger = Ledger { deposits: snapshot.deposits, ..Ledger::default() };
        for reservation in snapshot.reservations {
            ledger.put(reservation);
        }
        let max_seen = ledger.reservations.keys().next_back().map(|id| id.0 + 1).unwrap_or(0);
        ledger.next_id = snapshot.next_id.max(max_seen);
    }

    // ── Deposits ─────────────────────────────────────────────────────────────

    /// Credit `amount` to `prover`'s deposit. Returns the new balance.
    pub fn deposit(&self, prover: Address, amount: BondAmount) -> Result<BondAmount, ProverError> {
        let mut ledger = self.ledger();
        let balance = ledger
            .balance(&prover)
            .checked_add(amount)
            .ok_or_else(|| ProverError::InvalidTransition(format!("deposit overflows balance of {prover}")))?;
        if let Some(store) = &self.store {
            store.put_deposit(&prover, balance)?;
        }
        ledger.deposits.insert(prover, balance);
        info!(prover = %prover, amount = %amount, balance = %balance, "bond deposited");
        Ok(balance)
    }

    pub fn balance(&self, prover: &Address) -> BondAmount {
        self.ledger().balance(prover)
    }

    pub fn reserved_total(&self, prover: &Address) -> BondAmount {
        self.ledger().reserved_total(prover)
    }

    /// Deposit minus everything currently Reserved.
    pub fn available(&self, prover: &Address) -> BondAmount {
        self.ledger().available(prover)
    }

    // ── Reservations ─────────────────────────────────────────────────────────

    /// Set aside `amount` of `prover`'s deposit behind a quote for `epoch`.
    ///
    /// The availability check and the insert happen under one lock. A prover
    /// holds at most one Reserved reservation per epoch.
    pub fn reserve(
        &self,
        prover: Address,
        epoch: Epoch,
        amount: BondAmount,
    ) -> Result<BondReservation, ProverError> {
        let mut ledger = self.ledger();

        if ledger.open.contains_key(&(prover, epoch)) {
            return Err(ProverError::InvalidTransition(format!(
                "{prover} already holds a reservation for epoch {epoch}"
            )));
        }

        let available = ledger.available(&prover);
        if amount > available {
            warn!(prover = %prover, epoch = %epoch, need = %amount, available = %available, "insufficient bond");
            return Err(ProverError::InsufficientBond { need: amount, available });
        }

        let reservation = BondReservation {
            id: ReservationId(ledger.next_id),
            prover,
            epoch,
            amount,
            state: BondState::Reserved,
        };
        let next_id = ledger.next_id + 1;
        if let Some(store) = &self.store {
            store.put_reservation(&reservation)?;
            store.put_next_reservation_id(next_id)?;
        }
        ledger.next_id = next_id;
        ledger.put(reservation.clone());
        info!(
            reservation = %reservation.id,
            prover = %prover,
            epoch = %epoch,
            amount = %amount,
            "bond reserved"
        );
        Ok(reservation)
    }

    /// Return the reservation's amount to the available balance.
    pub fn release(&self, reservation: &BondReservation) -> Result<BondReservation, ProverError> {
        self.settle(reservation.id, BondState::Released)
    }

    /// Remove the reservation's amount from the prover's deposit for good.
    pub fn forfeit(&self, reservation: &BondReservation) -> Result<BondReservation, ProverError> {
        self.settle(reservation.id, BondState::Forfeited)
    }

    /// Same as `release` / `forfeit`, addressed by id.
    pub fn settle(&self, id: ReservationId, target: BondState) -> Result<BondReservation, ProverError> {
        let mut ledger = self.ledger();
        let current = ledger
            .reservations
            .get(&id)
            .cloned()
            .ok_or(ProverError::UnknownReservation(id.0))?;

        match (current.state, target) {
            (state, target) if state == target => {
                debug!(reservation = %id, state = ?state, "reservation already settled");
                return Ok(current);
            }
            (BondState::Reserved, BondState::Released | BondState::Forfeited) => {}
            (state, target) => {
                return Err(ProverError::InvalidTransition(format!(
                    "reservation {id}: {state:?} -> {target:?}"
                )));
            }
        }

        let mut settled = current;
        settled.state = target;
        let new_balance = if target == BondState::Forfeited {
            Some(ledger.balance(&settled.prover).saturating_sub(settled.amount))
        } else {
            None
        };

        if let Some(store) = &self.store {
            store.put_reservation(&settled)?;
            if let Some(balance) = new_balance {
                store.put_deposit(&settled.prover, balance)?;
            }
        }
        if let Some(balance) = new_balance {
            ledger.deposits.insert(settled.prover, balance);
        }
        ledger.put(settled.clone());

        match target {
            BondState::Forfeited => warn!(
                reservation = %id,
                prover = %settled.prover,
                epoch = %settled.epoch,
                amount = %settled.amount,
                "bond forfeited"
            ),
            _ => info!(
                reservation = %id,
                prover = %settled.prover,
                epoch = %settled.epoch,
                amount = %settled.amount,
                "bond released"
            ),
        }
        Ok(settled)
    }

    pub fn reservation(&self, id: ReservationId) -> Option<BondReservation> {
        self.ledger().reservations.get(&id).cloned()
    }

    /// Every reservation still in the Reserved state, in id order.
    pub fn outstanding(&self) -> Vec<BondReservation> {
        let ledger = self.ledger();
        let mut open: Vec<BondReservation> = ledger
            .open
            .values()
            .filter_map(|id| ledger.reservations.get(id).cloned())
            .collect();
        open.sort_by_key(|r| r.id);
        open
    }

    // ── Snapshots ────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> LedgerSnapshot {
        let ledger = self.ledger();
        LedgerSnapshot {
            deposits: ledger.deposits.clone(),
            reservations: ledger.reservations.values().cloned().collect(),
            next_id: ledger.next_id,
        }
    }
}
