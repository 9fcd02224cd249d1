use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use epochx_core::error::ProverError;
use epochx_core::types::Epoch;
use epochx_core::{EpochState, TrackedEpoch};
use epochx_state::StateDb;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    /// Settlement-chain reads keep failing; polling continues.
    Degraded,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub consecutive_chain_failures: u32,
    pub last_error: Option<String>,
    pub cursor: Option<Epoch>,
}

/// Which monitor made a settlement-chain read. Each keeps its own failure
/// streak, so one monitor's successful reads do not hide the other's
/// failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChainReader {
    Epochs,
    Claims,
}

#[derive(Default)]
struct Health {
    streaks: BTreeMap<ChainReader, u32>,
    last_error: Option<String>,
}

impl Health {
    fn worst(&self) -> u32 {
        self.streaks.values().copied().max().unwrap_or(0)
    }
}

/// Per-epoch lifecycle table, the epoch progress cursor and chain health.
///
/// Each mutation is a single call under one lock. The cursor is written
/// through to the store before memory moves.
pub struct EpochTracker {
    epochs: RwLock<BTreeMap<Epoch, TrackedEpoch>>,
    cursor: Mutex<Option<Epoch>>,
    health: Mutex<Health>,
    failure_threshold: u32,
    store: Option<Arc<StateDb>>,
}

impl EpochTracker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            epochs: RwLock::new(BTreeMap::new()),
            cursor: Mutex::new(None),
            health: Mutex::new(Health::default()),
            failure_threshold,
            store: None,
        }
    }

    /// Tracker whose cursor is persisted in `store` (and restored from it).
    pub fn open(store: Arc<StateDb>, failure_threshold: u32) -> Result<Self, ProverError> {
        let cursor = store.get_cursor()?;
        if let Some(c) = &cursor {
            info!(cursor = %c, "restored epoch cursor");
        }
        Ok(Self {
            cursor: Mutex::new(cursor),
            store: Some(store),
            ..Self::new(failure_threshold)
        })
    }

    // ── Cursor ───────────────────────────────────────────────────────────────

    pub fn cursor(&self) -> Option<Epoch> {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the cursor to `epoch`. Never moves it backwards.
    pub fn advance_cursor(&self, epoch: Epoch) -> Result<(), ProverError> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if (*cursor).is_some_and(|c| c >= epoch) {
            return Ok(());
        }
        if let Some(store) = &self.store {
            store.put_cursor(&epoch)?;
        }
        *cursor = Some(epoch);
        debug!(cursor = %epoch, "epoch cursor advanced");
        Ok(())
    }

    // ── Epoch table ──────────────────────────────────────────────────────────

    /// Move `epoch` to `state`. An epoch not yet in the table counts as
    /// Unconsidered; setting the state it already has is a no-op.
    pub fn set_state(
        &self,
        epoch: Epoch,
        state: EpochState,
        reason: Option<String>,
    ) -> Result<(), ProverError> {
        let mut epochs = self.epochs.write().unwrap_or_else(PoisonError::into_inner);
        let current = epochs.get(&epoch).map(|t| t.state).unwrap_or(EpochState::Unconsidered);
        if current == state {
            return Ok(());
        }
        if !current.can_transition_to(state) {
            return Err(ProverError::InvalidTransition(format!(
                "epoch {epoch}: {current} -> {state}"
            )));
        }
        match &reason {
            Some(r) => info!(epoch = %epoch, from = %current, to = %state, reason = %r, "epoch state"),
            None => info!(epoch = %epoch, from = %current, to = %state, "epoch state"),
        }
        epochs.insert(epoch, TrackedEpoch { epoch, state, reason, updated_at: Utc::now() });
        Ok(())
    }

    pub fn skip(&self, epoch: Epoch, reason: impl Into<String>) -> Result<(), ProverError> {
        self.set_state(epoch, EpochState::Skipped, Some(reason.into()))
    }

    /// Put `epoch` straight into `state`, bypassing transition checks. Used
    /// when rebuilding the table from persisted claims.
    pub fn restore(&self, epoch: Epoch, state: EpochState) {
        self.epochs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(epoch, TrackedEpoch { epoch, state, reason: None, updated_at: Utc::now() });
    }

    pub fn state(&self, epoch: &Epoch) -> Option<EpochState> {
        self.epochs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(epoch)
            .map(|t| t.state)
    }

    /// Snapshot of the whole table, oldest epoch first.
    pub fn states(&self) -> Vec<TrackedEpoch> {
        self.epochs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    // ── Health ───────────────────────────────────────────────────────────────

    pub fn record_chain_success(&self, reader: ChainReader) {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let was_degraded = health.worst() >= self.failure_threshold;
        health.streaks.remove(&reader);
        if health.streaks.is_empty() {
            health.last_error = None;
            if was_degraded {
                info!("settlement chain reachable again");
            }
        }
    }

    pub fn record_chain_failure(&self, reader: ChainReader, error: &ProverError) {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let streak = health.streaks.entry(reader).or_default();
        *streak = streak.saturating_add(1);
        let streak = *streak;
        health.last_error = Some(error.to_string());
        if streak == self.failure_threshold {
            warn!(reader = ?reader, failures = streak, error = %error, "node degraded: settlement chain reads failing");
        }
    }

    pub fn health(&self) -> HealthReport {
        let health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let failures = health.worst();
        let status = if failures >= self.failure_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        HealthReport {
            status,
            consecutive_chain_failures: failures,
            last_error: health.last_error.clone(),
            cursor: self.cursor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epochx_core::types::U256;

    fn e(n: u64) -> Epoch {
        U256::from(n)
    }

    #[test]
    fn cursor_never_moves_back() {
        let t = EpochTracker::new(3);
        assert_eq!(t.cursor(), None);
        t.advance_cursor(e(5)).unwrap();
        t.advance_cursor(e(3)).unwrap();
        assert_eq!(t.cursor(), Some(e(5)));
        t.advance_cursor(e(6)).unwrap();
        assert_eq!(t.cursor(), Some(e(6)));
    }

    #[test]
    fn cursor_persists_across_reopen() {
        let dir = std::env::temp_dir().join("epochx_tracker_test_cursor");
        let _ = std::fs::remove_dir_all(&dir);
        {
            let store = Arc::new(StateDb::open(&dir).unwrap());
            let t = EpochTracker::open(store, 3).unwrap();
            t.advance_cursor(e(41)).unwrap();
        }
        let store = Arc::new(StateDb::open(&dir).unwrap());
        assert_eq!(EpochTracker::open(store, 3).unwrap().cursor(), Some(e(41)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn states_follow_lifecycle() {
        let t = EpochTracker::new(3);
        t.set_state(e(1), EpochState::Quoting, None).unwrap();
        t.set_state(e(1), EpochState::Published, None).unwrap();
        t.set_state(e(1), EpochState::Published, None).unwrap();
        assert!(matches!(
            t.set_state(e(1), EpochState::Delivered, None),
            Err(ProverError::InvalidTransition(_))
        ));
        t.skip(e(0), "already proven").unwrap();
        let states = t.states();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].epoch, e(0));
        assert_eq!(states[0].reason.as_deref(), Some("already proven"));
        assert_eq!(t.state(&e(1)), Some(EpochState::Published));
    }

    #[test]
    fn restore_bypasses_checks() {
        let t = EpochTracker::new(3);
        t.restore(e(9), EpochState::Accepted);
        t.set_state(e(9), EpochState::Delivered, None).unwrap();
        assert_eq!(t.state(&e(9)), Some(EpochState::Delivered));
    }

    #[test]
    fn health_degrades_after_threshold_and_recovers() {
        let t = EpochTracker::new(3);
        let err = ProverError::ChainRead("connection refused".into());
        t.record_chain_failure(ChainReader::Epochs, &err);
        t.record_chain_failure(ChainReader::Epochs, &err);
        assert_eq!(t.health().status, HealthStatus::Healthy);
        t.record_chain_failure(ChainReader::Epochs, &err);
        let h = t.health();
        assert_eq!(h.status, HealthStatus::Degraded);
        assert_eq!(h.consecutive_chain_failures, 3);
        assert!(h.last_error.unwrap().contains("connection refused"));
        t.record_chain_success(ChainReader::Epochs);
        assert_eq!(t.health().status, HealthStatus::Healthy);
        assert_eq!(t.health().last_error, None);
    }

    #[test]
    fn one_reader_succeeding_does_not_clear_the_other() {
        let t = EpochTracker::new(2);
        let err = ProverError::ChainRead("claim status unavailable".into());
        for _ in 0..2 {
            t.record_chain_failure(ChainReader::Claims, &err);
            t.record_chain_success(ChainReader::Epochs);
        }
        let h = t.health();
        assert_eq!(h.status, HealthStatus::Degraded);
        assert_eq!(h.consecutive_chain_failures, 2);
        assert!(h.last_error.is_some());

        t.record_chain_success(ChainReader::Claims);
        assert_eq!(t.health().status, HealthStatus::Healthy);
        assert_eq!(t.health().last_error, None);
    }
}
