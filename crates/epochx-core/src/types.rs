use serde::{Deserialize, Serialize};
use std::fmt;

pub use alloy::primitives::{Address, B256, U256};

/// Epoch number as assigned by the settlement chain.
pub type Epoch = U256;

/// Settlement-chain slot number.
pub type Slot = U256;

/// Bond amounts in the settlement token's base unit.
pub type BondAmount = U256;

// ── ReservationId ────────────────────────────────────────────────────────────

/// Identifier of a bond reservation, unique within one bond ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(pub u64);

impl ReservationId {
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Debug for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReservationId({})", self.0)
    }
}

// ── JobHandle ────────────────────────────────────────────────────────────────

/// Opaque handle returned by the job broker for a submitted proving job.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobHandle({})", self.0)
    }
}

// ── TxEnvelope ───────────────────────────────────────────────────────────────

/// A rollup transaction as handed to the proving pipeline. The node never
/// interprets `data`; it only forwards it in the order coordination returned.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    pub hash: B256,
    pub data: Vec<u8>,
}

impl TxEnvelope {
    pub fn new(hash: B256, data: Vec<u8>) -> Self {
        Self { hash, data }
    }
}

impl fmt::Debug for TxEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxEnvelope({}, {}b)", self.hash, self.data.len())
    }
}
