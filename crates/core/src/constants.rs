//! Global constants for the Sovra core types.

/// Length in bytes of [`crate::Hash256`] values.
pub const HASH_SIZE: usize = 32;

/// Upper bound accepted for node name strings on the wire.
pub const MAX_NODE_NAME_LENGTH: usize = 256;
