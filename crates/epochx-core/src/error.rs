use alloy::primitives::{Address, U256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProverError {
    // ── Validation errors ────────────────────────────────────────────────────
    #[error("invalid basis point fee {fee}: must be within 0..=10000")]
    InvalidFee { fee: i64 },

    #[error("malformed quote payload: {0}")]
    MalformedPayload(String),

    // ── Economic errors ──────────────────────────────────────────────────────
    #[error("insufficient bond: need {need}, available {available}")]
    InsufficientBond { need: U256, available: U256 },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("unknown bond reservation: {0}")]
    UnknownReservation(u64),

    // ── Coordination errors ──────────────────────────────────────────────────
    #[error("quote publication failed: {0}")]
    Publish(String),

    #[error("transport error: {0}")]
    Transport(String),

    // ── Signature errors ─────────────────────────────────────────────────────
    #[error("quote signature does not recover to prover {expected}")]
    SignatureMismatch { expected: Address },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    // ── Collaborator errors ──────────────────────────────────────────────────
    #[error("quote provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("settlement chain read failed: {0}")]
    ChainRead(String),

    #[error("job broker error: {0}")]
    Broker(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ProverError {
    /// Errors that only cost the current epoch: the monitor skips it and
    /// moves on. Anything else points at a broken node or a poisoned quote.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProverError::InsufficientBond { .. }
                | ProverError::InvalidTransition(_)
                | ProverError::Publish(_)
                | ProverError::Transport(_)
                | ProverError::ProviderUnavailable(_)
                | ProverError::ChainRead(_)
                | ProverError::Broker(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn economic_and_coordination_errors_are_recoverable() {
        assert!(ProverError::InsufficientBond {
            need: U256::from(2),
            available: U256::from(1)
        }
        .is_recoverable());
        assert!(ProverError::Publish("peer gone".into()).is_recoverable());
        assert!(ProverError::ProviderUnavailable("503".into()).is_recoverable());
    }

    #[test]
    fn poisoned_quotes_are_not_recoverable() {
        let err = ProverError::SignatureMismatch { expected: Address::ZERO };
        assert!(!err.is_recoverable());
        assert!(!ProverError::InvalidFee { fee: -1 }.is_recoverable());
    }
}
