use alloy::primitives::{Address, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use epochx_core::{ProverError, QuotePayload, QuoteSignature, SignedQuote};
use tracing::debug;
use zeroize::Zeroizing;

/// Holds the prover's secp256k1 key and signs quote digests with it.
///
/// Signatures are deterministic (RFC 6979): the same payload and key always
/// produce the same bytes.
pub struct QuoteSigner {
    signer: PrivateKeySigner,
}

impl QuoteSigner {
    /// Parse a hex private key, with or without a `0x` prefix.
    pub fn from_private_key(hex_key: &str) -> Result<Self, ProverError> {
        let key = Zeroizing::new(hex_key.trim().trim_start_matches("0x").to_string());
        let signer: PrivateKeySigner = key
            .parse()
            .map_err(|e| ProverError::InvalidPrivateKey(format!("{e} (length {})", key.len())))?;
        Ok(Self { signer })
    }

    pub fn from_bytes(secret: &B256) -> Result<Self, ProverError> {
        let signer = PrivateKeySigner::from_bytes(secret)
            .map_err(|e| ProverError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Address derived from the key. Quotes must name it as `prover`.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign the payload's digest.
    pub fn sign(&self, payload: QuotePayload) -> Result<SignedQuote, ProverError> {
        let signature = self.sign_digest(&payload.signing_digest())?;
        debug!(
            epoch = %payload.epoch_to_prove(),
            prover = %payload.prover(),
            "signed epoch proof quote"
        );
        Ok(SignedQuote::new(payload, signature))
    }

    fn sign_digest(&self, digest: &B256) -> Result<QuoteSignature, ProverError> {
        let signature = self
            .signer
            .sign_hash_sync(digest)
            .map_err(|e| ProverError::Signing(e.to_string()))?;
        Ok(QuoteSignature(signature.as_bytes().to_vec()))
    }
}

impl std::fmt::Debug for QuoteSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QuoteSigner {{ address: {} }}", self.address())
    }
}

/// Recover the address that produced `signature` over `payload`'s digest.
pub fn recover_signer(
    payload: &QuotePayload,
    signature: &QuoteSignature,
) -> Result<Address, ProverError> {
    let sig = Signature::from_raw(signature.as_bytes())
        .map_err(|_| ProverError::SignatureMismatch { expected: payload.prover() })?;
    sig.recover_address_from_prehash(&payload.signing_digest())
        .map_err(|_| ProverError::SignatureMismatch { expected: payload.prover() })
}

/// Accept the quote only if its signature recovers to `payload.prover`.
pub fn verify_signed_quote(quote: &SignedQuote) -> Result<(), ProverError> {
    let expected = quote.payload().prover();
    let recovered = recover_signer(quote.payload(), quote.signature())?;
    if recovered != expected {
        return Err(ProverError::SignatureMismatch { expected });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use rand::RngCore;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn payload_for(prover: Address, epoch: u64) -> QuotePayload {
        QuotePayload::new(
            U256::from(epoch),
            U256::from(900u64),
            U256::from(1000u64),
            prover,
            250,
        )
        .unwrap()
    }

    fn random_signer() -> QuoteSigner {
        let mut rng = rand::thread_rng();
        loop {
            let mut secret = [0u8; 32];
            rng.fill_bytes(&mut secret);
            if let Ok(signer) = QuoteSigner::from_bytes(&B256::from(secret)) {
                return signer;
            }
        }
    }

    #[test]
    fn sign_recover_round_trip() {
        for _ in 0..8 {
            let signer = random_signer();
            for epoch in [0u64, 1, 42, u64::MAX] {
                let quote = signer.sign(payload_for(signer.address(), epoch)).unwrap();
                let recovered = recover_signer(quote.payload(), quote.signature()).unwrap();
                assert_eq!(recovered, signer.address());
                assert!(verify_signed_quote(&quote).is_ok());
            }
        }
    }

    #[test]
    fn key_parses_with_and_without_prefix() {
        let a = QuoteSigner::from_private_key(KEY).unwrap();
        let b = QuoteSigner::from_private_key(KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(QuoteSigner::from_private_key("0xdeadbeef").is_err());
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = QuoteSigner::from_private_key(KEY).unwrap();
        let p = payload_for(signer.address(), 42);
        let s1 = signer.sign(p.clone()).unwrap();
        let s2 = signer.sign(p).unwrap();
        assert_eq!(s1.signature(), s2.signature());
        assert_eq!(s1.signature().as_bytes().len(), 65);
    }

    #[test]
    fn foreign_prover_is_a_mismatch() {
        let signer = QuoteSigner::from_private_key(KEY).unwrap();
        let quote = signer.sign(payload_for(Address::from([0xAA; 20]), 42)).unwrap();
        assert!(matches!(
            verify_signed_quote(&quote),
            Err(ProverError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn signature_does_not_transfer_to_another_payload() {
        let signer = QuoteSigner::from_private_key(KEY).unwrap();
        let quote = signer.sign(payload_for(signer.address(), 42)).unwrap();
        let other = payload_for(signer.address(), 43);
        let forged = SignedQuote::new(other, quote.signature().clone());
        assert!(verify_signed_quote(&forged).is_err());
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let signer = QuoteSigner::from_private_key(KEY).unwrap();
        let quote = SignedQuote::new(payload_for(signer.address(), 1), QuoteSignature(vec![1u8; 12]));
        assert!(verify_signed_quote(&quote).is_err());
    }
}
