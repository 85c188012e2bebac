//! Canonical binary serialization for Sovra messages.
//!
//! Consensus messages are compared and digested by their encoded bytes, so
//! every encoder must be deterministic: fields are written in declaration
//! order, integers are little-endian, and all variable-length data is
//! length-prefixed with a compact var-int. Two writers given structurally
//! equal values produce byte-identical output.

pub mod error;
pub mod memory_reader;
pub mod serializable;
pub mod writer;

pub use error::{IoError, IoResult};
pub use memory_reader::MemoryReader;
pub use serializable::{helper, Serializable, SerializableExt};
pub use writer::BinaryWriter;
