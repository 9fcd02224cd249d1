use epochx_core::{BondReservation, TrackedEpoch};
use serde::{Deserialize, Serialize};

/// One row of `epochx_getEpochStates`.
/// 256-bit numbers travel as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEpochState {
    pub epoch: String,
    pub state: String,
    /// Why the epoch was skipped, when it was.
    pub reason: Option<String>,
    /// Unix seconds of the last transition.
    pub updated_at: i64,
}

impl From<&TrackedEpoch> for RpcEpochState {
    fn from(t: &TrackedEpoch) -> Self {
        Self {
            epoch: t.epoch.to_string(),
            state: t.state.to_string(),
            reason: t.reason.clone(),
            updated_at: t.updated_at.timestamp(),
        }
    }
}

/// Returned by `epochx_getHealth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcHealth {
    /// "Healthy" or "Degraded".
    pub status: String,
    pub consecutive_chain_failures: u32,
    pub last_error: Option<String>,
    /// Highest epoch already quoted or skipped.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcReservation {
    pub id: u64,
    pub epoch: String,
    pub amount: String,
    pub state: String,
}

impl From<&BondReservation> for RpcReservation {
    fn from(r: &BondReservation) -> Self {
        Self {
            id: r.id.0,
            epoch: r.epoch.to_string(),
            amount: r.amount.to_string(),
            state: format!("{:?}", r.state),
        }
    }
}

/// Returned by `epochx_getBond`. Amounts are decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcBond {
    pub prover: String,
    pub balance: String,
    pub available: String,
    pub reserved: String,
    pub outstanding: Vec<RpcReservation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use epochx_core::{Address, BondState, EpochState, ReservationId, U256};

    #[test]
    fn tracked_epoch_renders_as_strings() {
        let t = TrackedEpoch {
            epoch: U256::from(42u64),
            state: EpochState::Skipped,
            reason: Some("already proven".into()),
            updated_at: chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        let rpc = RpcEpochState::from(&t);
        assert_eq!(rpc.epoch, "42");
        assert_eq!(rpc.state, "Skipped");
        assert_eq!(rpc.updated_at, 1_700_000_000);
    }

    #[test]
    fn reservation_amounts_are_decimal() {
        let r = BondReservation {
            id: ReservationId(3),
            prover: Address::ZERO,
            epoch: U256::from(7u64),
            amount: U256::from(10u64).pow(U256::from(30u64)),
            state: BondState::Reserved,
        };
        let rpc = RpcReservation::from(&r);
        assert_eq!(rpc.amount, format!("1{}", "0".repeat(30)));
        assert_eq!(rpc.state, "Reserved");
    }
}
