/// ─── epochx Protocol Constants ──────────────────────────────────────────────
///
/// Layout constants for the epoch proof quote and the defaults a prover node
/// starts with when nothing else is configured.

// ── Quote schema ─────────────────────────────────────────────────────────────

/// Canonical function-signature string of the quote struct. Its keccak-256 is
/// the type identifier prefixed to every signing preimage.
pub const QUOTE_TYPE_SIGNATURE: &str = "EpochProofQuote(uint256 epochToProve,uint256 validUntilSlot,uint256 bondAmount,address prover,uint32 basisPointFee)";

/// Upper bound for `basisPointFee` (10000 bps = 100%).
pub const MAX_BASIS_POINT_FEE: u32 = 10_000;

// ── Canonical encoding ───────────────────────────────────────────────────────

/// Width of each 256-bit integer field (big-endian).
pub const UINT256_BYTES: usize = 32;

/// Width of the prover address.
pub const ADDRESS_BYTES: usize = 20;

/// Width of the fee field (big-endian u32).
pub const FEE_BYTES: usize = 4;

/// 3 × uint256 ‖ address ‖ uint32.
pub const QUOTE_PAYLOAD_LEN: usize = 3 * UINT256_BYTES + ADDRESS_BYTES + FEE_BYTES;

/// ABI words in the signing preimage: type hash plus the five fields.
pub const SIGNING_PREIMAGE_WORDS: usize = 6;

/// Secp256k1 signature as `r ‖ s ‖ v`.
pub const QUOTE_SIGNATURE_LEN: usize = 65;

/// Wire form of a signed quote: canonical payload followed by its signature.
pub const SIGNED_QUOTE_LEN: usize = QUOTE_PAYLOAD_LEN + QUOTE_SIGNATURE_LEN;

// ── Node defaults ────────────────────────────────────────────────────────────

/// Poll interval shared by the epoch and claims monitors (milliseconds).
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 1_000;

/// Outstanding (published but unresolved) quotes allowed at once.
pub const DEFAULT_MAX_PENDING_JOBS: usize = 10;

/// Proving jobs the node carries in flight across all epochs.
pub const DEFAULT_MAX_PARALLEL_BLOCKS_PER_EPOCH: usize = 32;

/// Slots a quote stays valid for when the quote provider does not say.
pub const DEFAULT_QUOTE_VALIDITY_SLOTS: u64 = 32;

/// Consecutive failed chain reads before health is reported as degraded.
pub const DEFAULT_CHAIN_FAILURE_THRESHOLD: u32 = 5;
