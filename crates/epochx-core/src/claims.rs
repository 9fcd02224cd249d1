//! epochx-core::claims
//!
//! Lifecycle records shared by the bond manager, the monitors and the store.
//!
//! - `BondReservation` — stake set aside behind one published quote.
//! - `ClaimRecord` — what the settlement chain did with that quote.
//! - `EpochState` — the per-epoch view surfaced to the host process.
//!
//! Every state enum only moves forward; `transition` rejects skips and
//! reversals with `ProverError::InvalidTransition`.

use std::fmt;

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProverError;
use crate::quote::SignedQuote;
use crate::types::{Epoch, JobHandle, ReservationId, Slot};

// ── Bond reservation ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondState {
    /// Counted against the prover's available balance.
    Reserved,
    /// Returned to the available balance.
    Released,
    /// Permanently removed from the prover's deposit.
    Forfeited,
}

impl BondState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BondState::Reserved)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondReservation {
    pub id: ReservationId,
    pub prover: Address,
    pub epoch: Epoch,
    pub amount: U256,
    pub state: BondState,
}

// ── Claim record ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// Published; the chain has not resolved the epoch yet.
    Pending,
    /// Our quote is the binding claim for the epoch.
    Accepted,
    /// Another quote won the epoch.
    Rejected,
    /// The chain slot passed `valid_until_slot` with no resolution.
    Expired,
    /// The proof was delivered; bond released.
    Delivered,
    /// The proof was not delivered in time; bond forfeited.
    Forfeited,
}

impl ClaimStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClaimStatus::Pending | ClaimStatus::Accepted)
    }

    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted) | (Pending, Rejected) | (Pending, Expired)
                | (Accepted, Delivered) | (Accepted, Forfeited)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub epoch: Epoch,
    pub quote: SignedQuote,
    pub quote_hash: B256,
    pub reservation: ReservationId,
    pub status: ClaimStatus,
    /// Set once the broker accepted the proving job for an accepted claim.
    pub job: Option<JobHandle>,
}

impl ClaimRecord {
    pub fn new(quote: SignedQuote, reservation: ReservationId) -> Self {
        Self {
            epoch: quote.epoch(),
            quote_hash: quote.quote_hash(),
            quote,
            reservation,
            status: ClaimStatus::Pending,
            job: None,
        }
    }

    pub fn valid_until_slot(&self) -> Slot {
        self.quote.payload().valid_until_slot()
    }

    pub fn transition(&mut self, next: ClaimStatus) -> Result<(), ProverError> {
        if !self.status.can_transition_to(next) {
            return Err(ProverError::InvalidTransition(format!(
                "claim for epoch {}: {:?} -> {:?}",
                self.epoch, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

// ── Settlement-chain observations ────────────────────────────────────────────

/// Proof state of an epoch as reported by the settlement chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochStatus {
    /// Not proven, and not open for claims (too early or window closed).
    Unproven,
    Proven,
    /// Finalized, unproven, and inside the claim window.
    Claimable,
}

/// Claim state of an epoch as reported by the settlement chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainClaimStatus {
    None,
    /// A quote with this hash is the binding claim.
    Accepted(B256),
    Rejected,
}

/// Outcome of a proving job as reported by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Delivered,
    /// The pipeline could not deliver within the epoch's enforcement window.
    Failed,
}

// ── Epoch state (observability) ──────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EpochState {
    Unconsidered,
    Quoting,
    Published,
    Accepted,
    Rejected,
    Expired,
    Delivered,
    Forfeited,
    Skipped,
}

impl EpochState {
    pub fn is_terminal(&self) -> bool {
        use EpochState::*;
        matches!(self, Rejected | Expired | Delivered | Forfeited | Skipped)
    }

    pub fn can_transition_to(&self, next: EpochState) -> bool {
        use EpochState::*;
        matches!(
            (self, next),
            (Unconsidered, Quoting) | (Unconsidered, Skipped)
                | (Quoting, Published) | (Quoting, Skipped)
                | (Published, Accepted) | (Published, Rejected) | (Published, Expired)
                | (Accepted, Delivered) | (Accepted, Forfeited)
        )
    }
}

impl From<ClaimStatus> for EpochState {
    fn from(status: ClaimStatus) -> Self {
        match status {
            ClaimStatus::Pending => EpochState::Published,
            ClaimStatus::Accepted => EpochState::Accepted,
            ClaimStatus::Rejected => EpochState::Rejected,
            ClaimStatus::Expired => EpochState::Expired,
            ClaimStatus::Delivered => EpochState::Delivered,
            ClaimStatus::Forfeited => EpochState::Forfeited,
        }
    }
}

impl fmt::Display for EpochState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One row of the observability table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEpoch {
    pub epoch: Epoch,
    pub state: EpochState,
    /// Why the epoch was skipped, when it was.
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::{QuotePayload, QuoteSignature};

    fn record() -> ClaimRecord {
        let payload = QuotePayload::new(
            U256::from(42u64),
            U256::from(900u64),
            U256::from(1000u64),
            Address::from([0xAA; 20]),
            250,
        )
        .unwrap();
        ClaimRecord::new(
            SignedQuote::new(payload, QuoteSignature(vec![0u8; 65])),
            ReservationId(1),
        )
    }

    #[test]
    fn claim_moves_forward_only() {
        let mut r = record();
        assert_eq!(r.status, ClaimStatus::Pending);
        assert_eq!(r.epoch, U256::from(42u64));
        r.transition(ClaimStatus::Accepted).unwrap();
        assert!(r.transition(ClaimStatus::Pending).is_err());
        assert!(r.transition(ClaimStatus::Rejected).is_err());
        r.transition(ClaimStatus::Forfeited).unwrap();
        assert!(r.status.is_terminal());
        assert!(r.transition(ClaimStatus::Delivered).is_err());
    }

    #[test]
    fn pending_cannot_skip_to_resolution() {
        let mut r = record();
        assert!(matches!(
            r.transition(ClaimStatus::Delivered),
            Err(ProverError::InvalidTransition(_))
        ));
        assert_eq!(r.status, ClaimStatus::Pending);
    }

    #[test]
    fn epoch_states_follow_the_quote_lifecycle() {
        use EpochState::*;
        assert!(Unconsidered.can_transition_to(Quoting));
        assert!(!Unconsidered.can_transition_to(Published));
        assert!(Quoting.can_transition_to(Skipped));
        assert!(!Skipped.can_transition_to(Quoting));
        assert!(!Published.can_transition_to(Delivered));
        assert_eq!(EpochState::from(ClaimStatus::Pending), Published);
    }

    #[test]
    fn bond_state_terminality() {
        assert!(!BondState::Reserved.is_terminal());
        assert!(BondState::Released.is_terminal());
        assert!(BondState::Forfeited.is_terminal());
    }
}
