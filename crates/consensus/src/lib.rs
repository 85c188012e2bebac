//! Sovra Consensus Module
//!
//! The replication core of the Sovra identity ledger. A node runs one or more
//! protocol instances (one master, zero or more backups) behind a single node
//! identity; this crate elects a per-instance primary on every view change and
//! fans client requests out across the instances.
//!
//! ## Components
//!
//! - **Quorums**: fault-tolerance thresholds derived from the pool size
//! - **Messages**: consensus message types with a canonical byte encoding
//! - **PrePrepares**: the 3PC-ordered registry of in-flight PrePrepares
//! - **Ledger**: ledger summaries used as freshness claims during elections
//! - **Selector**: the view-change / primary-selection state machine
//! - **Replicas**: growth, shrinkage and message fan-out of the instances
//! - **Bls**: BLS-BFT helper creation for multi-signature support
//! - **Service**: collaborator contracts provided by the enclosing node

pub mod bls;
pub mod config;
pub mod ledger;
pub mod messages;
pub mod preprepares;
pub mod quorums;
pub mod replicas;
pub mod selector;
pub mod service;

// Re-export main types
pub use bls::{BlsBft, BlsBftFactory, BlsGroupParams, BlsProvider, BlsPublicKey};
pub use config::ConsensusConfig;
pub use ledger::{LedgerId, LedgerInfo, LedgerRegistry, LedgerService, LedgerSummary};
pub use messages::{
    Checkpoint, Commit, ConsensusMessage, CurrentState, MessageKind, Ordered, PrePrepare, Prepare,
    ReplicaMessage, ReplicaOutput, ViewChangeDone,
};
pub use preprepares::PrePrepares;
pub use quorums::{Quorum, Quorums};
pub use replicas::{Replica, ReplicaFactory, Replicas, ReplicasStats};
pub use selector::{PrimarySelector, SelectionBasis, ViewChangeVote};
pub use service::{NodeMode, NodeService};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Consensus-specific error types
#[derive(Error, Debug)]
pub enum Error {
    /// Inbound message failed structural validation
    #[error("invalid consensus message: {0}")]
    InvalidMessage(String),

    /// Configuration error
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// BLS keys are not available for this node
    #[error("BLS keys not found for node {node_name}")]
    MissingBlsKeys { node_name: String },

    /// The BLS key store exists but its content is unusable
    #[error("BLS key store failure: {0}")]
    BlsKeyStore(String),

    /// A PrePrepare was looked up by a key that was never registered
    #[error("no PrePrepare registered at ({view_no}, {seq_no})")]
    PrePrepareNotRegistered {
        view_no: ViewNumber,
        seq_no: SeqNumber,
    },

    /// An operation required at least one replica
    #[error("replica collection is empty")]
    NoReplicas,

    /// Serialization error
    #[error("serialization error: {0}")]
    Io(#[from] sovra_io::IoError),

    /// Core type error
    #[error("core error: {0}")]
    Core(#[from] sovra_core::CoreError),
}

/// Consensus view number
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ViewNumber(pub u64);

impl ViewNumber {
    /// Creates a new view number
    pub fn new(view: u64) -> Self {
        Self(view)
    }

    /// Gets the view number value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Gets the next view number
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ViewNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number of an ordering slot, strictly monotone within a view
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SeqNumber(pub u64);

impl SeqNumber {
    /// Creates a new sequence number
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Gets the sequence number value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Gets the next sequence number
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol instance index; instance 0 is the master
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct InstanceId(pub u16);

impl InstanceId {
    /// The master instance
    pub const MASTER: InstanceId = InstanceId(0);

    /// Creates a new instance id
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    /// Gets the instance id value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Checks whether this is the master instance
    pub fn is_master(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short opaque name identifying a node in the pool
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    /// Creates a node name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrows the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Name of a replica, derived deterministically from its node and instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaName {
    node_name: NodeName,
    instance_id: InstanceId,
}

impl ReplicaName {
    /// Creates the replica name for `(node_name, instance_id)`
    pub fn new(node_name: NodeName, instance_id: InstanceId) -> Self {
        Self {
            node_name,
            instance_id,
        }
    }

    /// Gets the node part of the name
    pub fn node_name(&self) -> &NodeName {
        &self.node_name
    }

    /// Gets the instance part of the name
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }
}

impl fmt::Display for ReplicaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_name, self.instance_id)
    }
}

/// The `(view, seq)` pair that totally orders 3PC slots within and across views
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ThreePhaseKey {
    pub view_no: ViewNumber,
    pub seq_no: SeqNumber,
}

impl ThreePhaseKey {
    /// Creates a new 3PC key
    pub fn new(view_no: ViewNumber, seq_no: SeqNumber) -> Self {
        Self { view_no, seq_no }
    }
}

impl fmt::Display for ThreePhaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.view_no, self.seq_no)
    }
}
