//! epochx-core::quote
//!
//! The epoch proof quote: a bid to prove one epoch for a fee, backed by a bond.
//!
//! Two encodings exist and must not be confused:
//! - the compact canonical encoding (`encode` / `decode`), 120 bytes, used on
//!   the wire and as the quote's identity;
//! - the ABI-style signing preimage (type hash plus six 32-byte words), whose
//!   keccak-256 is the digest the prover signs. A verifier can rebuild it from
//!   the five public fields alone.

use std::fmt;
use std::hash::{Hash, Hasher};

use alloy::primitives::{Address, B256, U256};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::constants::{
    ADDRESS_BYTES, FEE_BYTES, MAX_BASIS_POINT_FEE, QUOTE_PAYLOAD_LEN, QUOTE_SIGNATURE_LEN,
    QUOTE_TYPE_SIGNATURE, SIGNED_QUOTE_LEN, SIGNING_PREIMAGE_WORDS, UINT256_BYTES,
};
use crate::error::ProverError;
use crate::hash::keccak256;
use crate::types::Epoch;

/// keccak256 of `QUOTE_TYPE_SIGNATURE`. Computed once per process.
pub static QUOTE_TYPE_HASH: Lazy<B256> = Lazy::new(|| keccak256(QUOTE_TYPE_SIGNATURE.as_bytes()));

// ── QuoteFields ──────────────────────────────────────────────────────────────

/// The five public fields of a quote, in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteFields {
    pub epoch_to_prove: U256,
    pub valid_until_slot: U256,
    pub bond_amount: U256,
    pub prover: Address,
    pub basis_point_fee: u32,
}

// ── QuotePayload ─────────────────────────────────────────────────────────────

/// Immutable quote payload. The canonical bytes and the signing digest are
/// computed when the payload is built and never change afterwards.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "QuoteFields", into = "QuoteFields")]
pub struct QuotePayload {
    fields: QuoteFields,
    encoded: [u8; QUOTE_PAYLOAD_LEN],
    digest: B256,
}

impl QuotePayload {
    /// Build a payload, rejecting fees outside `0..=10000` basis points.
    pub fn new(
        epoch_to_prove: U256,
        valid_until_slot: U256,
        bond_amount: U256,
        prover: Address,
        basis_point_fee: i64,
    ) -> Result<Self, ProverError> {
        if !(0..=MAX_BASIS_POINT_FEE as i64).contains(&basis_point_fee) {
            return Err(ProverError::InvalidFee { fee: basis_point_fee });
        }
        Ok(Self::freeze(QuoteFields {
            epoch_to_prove,
            valid_until_slot,
            bond_amount,
            prover,
            basis_point_fee: basis_point_fee as u32,
        }))
    }

    pub fn from_fields(fields: QuoteFields) -> Result<Self, ProverError> {
        Self::new(
            fields.epoch_to_prove,
            fields.valid_until_slot,
            fields.bond_amount,
            fields.prover,
            fields.basis_point_fee as i64,
        )
    }

    fn freeze(fields: QuoteFields) -> Self {
        let encoded = encode_fields(&fields);
        let digest = keccak256(&signing_preimage(&fields));
        Self { fields, encoded, digest }
    }

    /// Decode the canonical encoding. The buffer must be exactly
    /// `QUOTE_PAYLOAD_LEN` bytes and carry an in-range fee.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProverError> {
        if bytes.len() != QUOTE_PAYLOAD_LEN {
            return Err(ProverError::MalformedPayload(format!(
                "expected {QUOTE_PAYLOAD_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let epoch_to_prove = U256::from_be_slice(&bytes[0..UINT256_BYTES]);
        let valid_until_slot = U256::from_be_slice(&bytes[UINT256_BYTES..2 * UINT256_BYTES]);
        let bond_amount = U256::from_be_slice(&bytes[2 * UINT256_BYTES..3 * UINT256_BYTES]);
        let address_end = 3 * UINT256_BYTES + ADDRESS_BYTES;
        let prover = Address::from_slice(&bytes[3 * UINT256_BYTES..address_end]);
        let mut fee = [0u8; FEE_BYTES];
        fee.copy_from_slice(&bytes[address_end..]);
        let basis_point_fee = u32::from_be_bytes(fee);

        if basis_point_fee > MAX_BASIS_POINT_FEE {
            return Err(ProverError::MalformedPayload(format!(
                "basis point fee {basis_point_fee} out of range"
            )));
        }
        Ok(Self::freeze(QuoteFields {
            epoch_to_prove,
            valid_until_slot,
            bond_amount,
            prover,
            basis_point_fee,
        }))
    }

    /// Canonical byte encoding.
    pub fn encode(&self) -> &[u8] {
        &self.encoded
    }

    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    /// keccak256 of the ABI-style signing preimage.
    pub fn signing_digest(&self) -> B256 {
        self.digest
    }

    /// The ABI-style preimage whose hash is `signing_digest`.
    pub fn signing_preimage(&self) -> Vec<u8> {
        signing_preimage(&self.fields)
    }

    pub fn fields(&self) -> &QuoteFields {
        &self.fields
    }

    pub fn epoch_to_prove(&self) -> Epoch {
        self.fields.epoch_to_prove
    }

    pub fn valid_until_slot(&self) -> U256 {
        self.fields.valid_until_slot
    }

    pub fn bond_amount(&self) -> U256 {
        self.fields.bond_amount
    }

    pub fn prover(&self) -> Address {
        self.fields.prover
    }

    pub fn basis_point_fee(&self) -> u32 {
        self.fields.basis_point_fee
    }
}

fn encode_fields(f: &QuoteFields) -> [u8; QUOTE_PAYLOAD_LEN] {
    let mut out = [0u8; QUOTE_PAYLOAD_LEN];
    out[0..32].copy_from_slice(&f.epoch_to_prove.to_be_bytes::<32>());
    out[32..64].copy_from_slice(&f.valid_until_slot.to_be_bytes::<32>());
    out[64..96].copy_from_slice(&f.bond_amount.to_be_bytes::<32>());
    out[96..116].copy_from_slice(f.prover.as_slice());
    out[116..120].copy_from_slice(&f.basis_point_fee.to_be_bytes());
    out
}

/// `abi.encode(bytes32, uint256, uint256, uint256, address, uint256)`: every
/// value occupies one 32-byte word, the address left-padded with zeroes.
fn signing_preimage(f: &QuoteFields) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIGNING_PREIMAGE_WORDS * 32);
    out.extend_from_slice(QUOTE_TYPE_HASH.as_slice());
    out.extend_from_slice(&f.epoch_to_prove.to_be_bytes::<32>());
    out.extend_from_slice(&f.valid_until_slot.to_be_bytes::<32>());
    out.extend_from_slice(&f.bond_amount.to_be_bytes::<32>());
    out.extend_from_slice(&[0u8; 32 - ADDRESS_BYTES]);
    out.extend_from_slice(f.prover.as_slice());
    out.extend_from_slice(&U256::from(f.basis_point_fee).to_be_bytes::<32>());
    out
}

impl TryFrom<QuoteFields> for QuotePayload {
    type Error = ProverError;

    fn try_from(fields: QuoteFields) -> Result<Self, Self::Error> {
        Self::from_fields(fields)
    }
}

impl From<QuotePayload> for QuoteFields {
    fn from(payload: QuotePayload) -> Self {
        payload.fields
    }
}

impl PartialEq for QuotePayload {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for QuotePayload {}

impl Hash for QuotePayload {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state);
    }
}

impl fmt::Debug for QuotePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuotePayload {{ epoch_to_prove: {}, valid_until_slot: {}, bond_amount: {}, prover: {}, basis_point_fee: {} }}",
            self.fields.epoch_to_prove,
            self.fields.valid_until_slot,
            self.fields.bond_amount,
            self.fields.prover,
            self.fields.basis_point_fee
        )
    }
}

// ── QuoteSignature ───────────────────────────────────────────────────────────

/// Secp256k1 signature over a quote's signing digest (`r ‖ s ‖ v`, 65 bytes).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteSignature(pub Vec<u8>);

impl QuoteSignature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for QuoteSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuoteSignature({}b)", self.0.len())
    }
}

// ── SignedQuote ──────────────────────────────────────────────────────────────

/// A payload together with the prover's signature over its digest.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedQuote {
    payload: QuotePayload,
    signature: QuoteSignature,
}

impl SignedQuote {
    pub fn new(payload: QuotePayload, signature: QuoteSignature) -> Self {
        Self { payload, signature }
    }

    pub fn payload(&self) -> &QuotePayload {
        &self.payload
    }

    pub fn signature(&self) -> &QuoteSignature {
        &self.signature
    }

    pub fn epoch(&self) -> Epoch {
        self.payload.epoch_to_prove()
    }

    /// `payload ‖ signature`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNED_QUOTE_LEN);
        out.extend_from_slice(self.payload.encode());
        out.extend_from_slice(self.signature.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProverError> {
        if bytes.len() != SIGNED_QUOTE_LEN {
            return Err(ProverError::MalformedPayload(format!(
                "expected {SIGNED_QUOTE_LEN} signed quote bytes, got {}",
                bytes.len()
            )));
        }
        let (payload, signature) = bytes.split_at(QUOTE_PAYLOAD_LEN);
        debug_assert_eq!(signature.len(), QUOTE_SIGNATURE_LEN);
        Ok(Self {
            payload: QuotePayload::decode(payload)?,
            signature: QuoteSignature(signature.to_vec()),
        })
    }

    /// Identity of the quote on the settlement chain and in gossip.
    pub fn quote_hash(&self) -> B256 {
        keccak256(&self.to_bytes())
    }
}

impl fmt::Debug for SignedQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignedQuote {{ {:?}, {:?} }}", self.payload, self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn prover() -> Address {
        Address::from([0xAA; 20])
    }

    fn sample(epoch: u64) -> QuotePayload {
        QuotePayload::new(
            U256::from(epoch),
            U256::from(900u64),
            U256::from(1000u64),
            prover(),
            250,
        )
        .unwrap()
    }

    fn random_word<R: Rng>(rng: &mut R) -> U256 {
        let mut b = [0u8; 32];
        rng.fill_bytes(&mut b);
        U256::from_be_bytes(b)
    }

    fn random_payload<R: Rng>(rng: &mut R) -> QuotePayload {
        let mut addr = [0u8; 20];
        rng.fill_bytes(&mut addr);
        QuotePayload::new(
            random_word(rng),
            random_word(rng),
            random_word(rng),
            Address::from(addr),
            rng.gen_range(0..=10_000),
        )
        .unwrap()
    }

    #[test]
    fn decode_inverts_encode() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let p = random_payload(&mut rng);
            let decoded = QuotePayload::decode(p.encode()).unwrap();
            assert_eq!(decoded, p);
            assert_eq!(decoded.signing_digest(), p.signing_digest());
        }
    }

    #[test]
    fn canonical_layout_is_fixed() {
        let p = sample(42);
        let bytes = p.encode();
        assert_eq!(bytes.len(), QUOTE_PAYLOAD_LEN);
        assert_eq!(p.encoded_len(), 120);
        assert_eq!(bytes[31], 42);
        assert!(bytes[..31].iter().all(|b| *b == 0));
        assert_eq!(&bytes[62..64], &900u16.to_be_bytes());
        assert_eq!(&bytes[94..96], &1000u16.to_be_bytes());
        assert_eq!(&bytes[96..116], &[0xAA; 20]);
        assert_eq!(&bytes[116..120], &250u32.to_be_bytes());
    }

    #[test]
    fn fee_bounds_are_enforced() {
        for fee in [-1i64, 10_001] {
            let err = QuotePayload::new(U256::ZERO, U256::ZERO, U256::ZERO, prover(), fee);
            assert!(matches!(err, Err(ProverError::InvalidFee { fee: f }) if f == fee));
        }
        for fee in [0i64, 10_000] {
            let p = QuotePayload::new(U256::ZERO, U256::ZERO, U256::ZERO, prover(), fee).unwrap();
            assert_eq!(p.basis_point_fee() as i64, fee);
        }
    }

    #[test]
    fn decode_rejects_short_and_out_of_range_input() {
        let p = sample(1);
        assert!(matches!(
            QuotePayload::decode(&p.encode()[..119]),
            Err(ProverError::MalformedPayload(_))
        ));
        assert!(matches!(QuotePayload::decode(&[]), Err(ProverError::MalformedPayload(_))));

        let mut bytes = p.encode().to_vec();
        bytes[116..120].copy_from_slice(&10_001u32.to_be_bytes());
        assert!(matches!(
            QuotePayload::decode(&bytes),
            Err(ProverError::MalformedPayload(_))
        ));
    }

    #[test]
    fn digest_differs_by_epoch() {
        assert_ne!(sample(42).signing_digest(), sample(43).signing_digest());
    }

    #[test]
    fn type_hash_matches_schema_string() {
        assert_eq!(*QUOTE_TYPE_HASH, keccak256(QUOTE_TYPE_SIGNATURE.as_bytes()));
        let preimage = sample(42).signing_preimage();
        assert_eq!(preimage.len(), SIGNING_PREIMAGE_WORDS * 32);
        assert_eq!(&preimage[..32], QUOTE_TYPE_HASH.as_slice());
    }

    #[test]
    fn signing_preimage_pads_every_field_to_a_word() {
        let preimage = sample(42).signing_preimage();
        assert_eq!(preimage[63], 42);
        assert!(preimage[128..140].iter().all(|b| *b == 0));
        assert_eq!(&preimage[140..160], &[0xAA; 20]);
        assert_eq!(&preimage[188..192], &250u32.to_be_bytes());
        assert_eq!(sample(42).signing_digest(), keccak256(&preimage));
    }

    #[test]
    fn equality_ignores_cached_derivations() {
        let a = sample(7);
        let b = QuotePayload::from_fields(*a.fields()).unwrap();
        assert_eq!(a, b);

        use std::collections::HashSet;
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn signed_quote_wire_form() {
        let quote = SignedQuote::new(sample(42), QuoteSignature(vec![7u8; QUOTE_SIGNATURE_LEN]));
        let bytes = quote.to_bytes();
        assert_eq!(bytes.len(), SIGNED_QUOTE_LEN);
        assert_eq!(SignedQuote::from_bytes(&bytes).unwrap(), quote);
        assert!(SignedQuote::from_bytes(&bytes[1..]).is_err());
        assert_eq!(quote.quote_hash(), keccak256(&bytes));
    }

    #[test]
    fn serde_revalidates_fee() {
        let p = sample(3);
        let bytes = bincode::serialize(&p).unwrap();
        let back: QuotePayload = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, p);
        assert_eq!(back.signing_digest(), p.signing_digest());

        let mut fields = *p.fields();
        fields.basis_point_fee = 20_000;
        let bad = bincode::serialize(&fields).unwrap();
        assert!(bincode::deserialize::<QuotePayload>(&bad).is_err());
    }
}
