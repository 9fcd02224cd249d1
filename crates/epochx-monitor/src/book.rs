use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use epochx_core::error::ProverError;
use epochx_core::types::Epoch;
use epochx_core::{ClaimRecord, ClaimStatus};
use epochx_state::StateDb;
use tracing::info;

#[derive(Default)]
struct Records {
    by_epoch: BTreeMap<Epoch, ClaimRecord>,
    pending: usize,
    accepted: usize,
}

impl Records {
    fn tally(&mut self, status: ClaimStatus, up: bool) {
        let counter = match status {
            ClaimStatus::Pending => &mut self.pending,
            ClaimStatus::Accepted => &mut self.accepted,
            _ => return,
        };
        *counter = if up { *counter + 1 } else { counter.saturating_sub(1) };
    }

    fn put(&mut self, record: ClaimRecord) {
        self.tally(record.status, true);
        if let Some(old) = self.by_epoch.insert(record.epoch, record) {
            self.tally(old.status, false);
        }
    }

    fn take(&mut self, epoch: &Epoch) {
        if let Some(old) = self.by_epoch.remove(epoch) {
            self.tally(old.status, false);
        }
    }
}

/// Claim records by epoch, written through to the store when one is attached.
///
/// Pending and Accepted counts are kept alongside the map so the capacity
/// checks on every epoch do not walk the whole history.
pub struct ClaimBook {
    records: Mutex<Records>,
    store: Option<Arc<StateDb>>,
}

impl Default for ClaimBook {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimBook {
    pub fn new() -> Self {
        Self { records: Mutex::new(Records::default()), store: None }
    }

    pub fn open(store: Arc<StateDb>) -> Result<Self, ProverError> {
        let mut records = Records::default();
        for record in store.claims()? {
            records.put(record);
        }
        let active = records.pending + records.accepted;
        if active > 0 {
            info!(active, "restored open claims");
        }
        Ok(Self { records: Mutex::new(records), store: Some(store) })
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly signed quote. An epoch holds at most one
    /// unresolved claim.
    pub fn insert(&self, record: ClaimRecord) -> Result<(), ProverError> {
        let mut records = self.records();
        if let Some(existing) = records.by_epoch.get(&record.epoch) {
            if !existing.status.is_terminal() {
                return Err(ProverError::InvalidTransition(format!(
                    "epoch {} already has a {:?} claim",
                    record.epoch, existing.status
                )));
            }
        }
        if let Some(store) = &self.store {
            store.put_claim(&record)?;
        }
        records.put(record);
        Ok(())
    }

    /// Undo an `insert` whose quote never left the node: put back `previous`
    /// (the record it displaced, if any) or drop the epoch's entry.
    pub fn withdraw(&self, epoch: &Epoch, previous: Option<ClaimRecord>) -> Result<(), ProverError> {
        let mut records = self.records();
        match previous {
            Some(previous) => {
                if let Some(store) = &self.store {
                    store.put_claim(&previous)?;
                }
                records.put(previous);
            }
            None => {
                if let Some(store) = &self.store {
                    store.remove_claim(epoch)?;
                }
                records.take(epoch);
            }
        }
        Ok(())
    }

    /// Overwrite the record for `record.epoch`.
    pub fn update(&self, record: &ClaimRecord) -> Result<(), ProverError> {
        let mut records = self.records();
        if let Some(store) = &self.store {
            store.put_claim(record)?;
        }
        records.put(record.clone());
        Ok(())
    }

    pub fn get(&self, epoch: &Epoch) -> Option<ClaimRecord> {
        self.records().by_epoch.get(epoch).cloned()
    }

    pub fn all(&self) -> Vec<ClaimRecord> {
        self.records().by_epoch.values().cloned().collect()
    }

    /// Highest epoch with a record of any status.
    pub fn newest_epoch(&self) -> Option<Epoch> {
        self.records().by_epoch.keys().next_back().copied()
    }

    /// Pending and Accepted records, oldest epoch first.
    pub fn active(&self) -> Vec<ClaimRecord> {
        self.records()
            .by_epoch
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Published quotes still awaiting the chain's decision.
    pub fn pending_count(&self) -> usize {
        self.records().pending
    }

    /// Accepted claims whose proof is still being produced.
    pub fn in_flight_count(&self) -> usize {
        self.records().accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epochx_core::types::{Address, ReservationId, U256};
    use epochx_core::{QuotePayload, QuoteSignature, SignedQuote};

    fn record(epoch: u64) -> ClaimRecord {
        let payload = QuotePayload::new(
            U256::from(epoch),
            U256::from(900u64),
            U256::from(1000u64),
            Address::from([0xAA; 20]),
            250,
        )
        .unwrap();
        ClaimRecord::new(SignedQuote::new(payload, QuoteSignature(vec![1u8; 65])), ReservationId(epoch))
    }

    #[test]
    fn one_open_claim_per_epoch() {
        let book = ClaimBook::new();
        book.insert(record(42)).unwrap();
        assert!(matches!(book.insert(record(42)), Err(ProverError::InvalidTransition(_))));

        let mut r = book.get(&U256::from(42u64)).unwrap();
        r.transition(ClaimStatus::Rejected).unwrap();
        book.update(&r).unwrap();
        book.insert(record(42)).unwrap();
    }

    #[test]
    fn counts_split_pending_and_in_flight() {
        let book = ClaimBook::new();
        for epoch in 1..=3 {
            book.insert(record(epoch)).unwrap();
        }
        let mut r = book.get(&U256::from(2u64)).unwrap();
        r.transition(ClaimStatus::Accepted).unwrap();
        book.update(&r).unwrap();
        let mut r = book.get(&U256::from(3u64)).unwrap();
        r.transition(ClaimStatus::Expired).unwrap();
        book.update(&r).unwrap();

        assert_eq!(book.pending_count(), 1);
        assert_eq!(book.in_flight_count(), 1);
        assert_eq!(book.active().len(), 2);
        assert_eq!(book.all().len(), 3);

        let mut r = book.get(&U256::from(2u64)).unwrap();
        r.transition(ClaimStatus::Delivered).unwrap();
        book.update(&r).unwrap();
        assert_eq!(book.in_flight_count(), 0);
        assert_eq!(book.pending_count(), 1);
        assert_eq!(book.newest_epoch(), Some(U256::from(3u64)));
    }

    #[test]
    fn withdraw_undoes_an_insert() {
        let book = ClaimBook::new();
        book.insert(record(5)).unwrap();
        book.withdraw(&U256::from(5u64), None).unwrap();
        assert!(book.get(&U256::from(5u64)).is_none());
        assert_eq!(book.pending_count(), 0);

        book.insert(record(6)).unwrap();
        let mut earlier = book.get(&U256::from(6u64)).unwrap();
        earlier.transition(ClaimStatus::Expired).unwrap();
        book.update(&earlier).unwrap();
        book.insert(record(6)).unwrap();
        assert_eq!(book.pending_count(), 1);
        book.withdraw(&U256::from(6u64), Some(earlier.clone())).unwrap();
        assert_eq!(book.get(&U256::from(6u64)), Some(earlier));
        assert_eq!(book.pending_count(), 0);
    }

    #[test]
    fn withdrawn_claim_is_gone_after_reopen() {
        let dir = std::env::temp_dir().join("epochx_book_test_withdraw");
        let _ = std::fs::remove_dir_all(&dir);
        {
            let book = ClaimBook::open(Arc::new(StateDb::open(&dir).unwrap())).unwrap();
            book.insert(record(8)).unwrap();
            book.withdraw(&U256::from(8u64), None).unwrap();
        }
        let book = ClaimBook::open(Arc::new(StateDb::open(&dir).unwrap())).unwrap();
        assert!(book.all().is_empty());
        drop(book);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = std::env::temp_dir().join("epochx_book_test_reopen");
        let _ = std::fs::remove_dir_all(&dir);
        {
            let book = ClaimBook::open(Arc::new(StateDb::open(&dir).unwrap())).unwrap();
            book.insert(record(7)).unwrap();
        }
        let book = ClaimBook::open(Arc::new(StateDb::open(&dir).unwrap())).unwrap();
        assert_eq!(book.active(), vec![record(7)]);
        drop(book);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
