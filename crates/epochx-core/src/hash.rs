use alloy::primitives::B256;
use sha3::{Digest, Keccak256};

/// Compute Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let out: [u8; 32] = hasher.finalize().into();
    B256::from(out)
}
