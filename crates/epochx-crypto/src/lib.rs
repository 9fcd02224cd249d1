pub mod signer;

pub use signer::{recover_signer, verify_signed_quote, QuoteSigner};
