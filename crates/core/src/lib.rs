//! Fundamental value types shared across the Sovra crates.
//!
//! The consensus core deals in ledger root hashes and message digests; both
//! are 32-byte values represented by [`Hash256`]. Everything protocol-specific
//! lives in `sovra-consensus`.

pub mod constants;
pub mod error;
pub mod hash256;

pub use constants::HASH_SIZE;
pub use error::{CoreError, CoreResult};
pub use hash256::Hash256;
