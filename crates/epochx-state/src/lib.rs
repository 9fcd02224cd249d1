//! epochx-state
//!
//! Persistent node state: the epoch progress cursor, the bond ledger and the
//! claim records, so a restarted node resumes exactly where it stopped.

pub mod db;

pub use db::StateDb;
