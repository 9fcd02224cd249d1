//! epochx-monitor
//!
//! The two periodic tasks of a prover node and the state they share.
//!
//! - `EpochMonitor` walks completed epochs in order and asks an
//!   `EpochHandler` to quote the claimable ones.
//! - `ClaimsMonitor` watches published quotes until the settlement chain and
//!   the job broker resolve them, settling bonds along the way.
//! - `ClaimBook` holds the claim records, `EpochTracker` the per-epoch
//!   lifecycle table, the progress cursor and connection health.

pub mod book;
pub mod claims;
pub mod epoch;
pub mod runner;
pub mod tracker;
pub mod traits;

pub use book::ClaimBook;
pub use claims::ClaimsMonitor;
pub use epoch::EpochMonitor;
pub use runner::run_with_shutdown;
pub use tracker::{ChainReader, EpochTracker, HealthReport, HealthStatus};
pub use traits::{EpochHandler, JobBroker, SettlementChain};
