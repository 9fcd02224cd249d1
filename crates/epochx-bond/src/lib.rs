//! epochx-bond
//!
//! The bond ledger: deposits per prover and the reservations that back
//! published quotes. A reservation only ever moves Reserved → Released or
//! Reserved → Forfeited, and the Reserved total for a prover never exceeds
//! its deposit.

pub mod manager;

pub use manager::{BondManager, LedgerSnapshot};
