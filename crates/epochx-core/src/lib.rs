pub mod claims;
pub mod constants;
pub mod error;
pub mod hash;
pub mod options;
pub mod quote;
pub mod types;

pub use claims::*;
pub use constants::*;
pub use error::ProverError;
pub use options::NodeOptions;
pub use quote::{QuoteFields, QuotePayload, QuoteSignature, SignedQuote, QUOTE_TYPE_HASH};
pub use types::*;
