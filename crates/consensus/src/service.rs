//! Collaborator contracts provided by the enclosing node.
//!
//! The consensus core never holds a full node; it is handed these narrow
//! capabilities at construction. All methods are synchronous: the core runs
//! on a single cooperative event loop and suspends only at the transport
//! boundaries.

use crate::{quorums::Quorums, InstanceId, NodeName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Startup lifecycle of a node.
///
/// Ordering matters: a node is considered synced from [`NodeMode::Synced`]
/// onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeMode {
    /// Establishing connections to the pool
    Discovering,
    /// Catching up with the accepted ledger state
    Syncing,
    /// Caught up but not yet processing requests
    Synced,
    /// Fully participating in ordering
    Participating,
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMode::Discovering => write!(f, "Discovering"),
            NodeMode::Syncing => write!(f, "Syncing"),
            NodeMode::Synced => write!(f, "Synced"),
            NodeMode::Participating => write!(f, "Participating"),
        }
    }
}

/// Capabilities the enclosing node grants to the consensus core.
pub trait NodeService {
    /// This node's name.
    fn name(&self) -> NodeName;

    /// Number of nodes in the pool.
    fn total_nodes(&self) -> usize;

    /// Current lifecycle mode.
    fn mode(&self) -> NodeMode;

    /// Whether the node has caught up with the accepted ledger state.
    fn is_synced(&self) -> bool {
        self.mode() >= NodeMode::Synced
    }

    /// Resolves a pool rank to a node name; `None` when the rank is out of
    /// range.
    fn get_name_by_rank(&self, rank: usize) -> Option<NodeName>;

    /// Quorum thresholds for the current pool size.
    fn quorums(&self) -> Quorums;

    /// Asks the node to start catching up; non-blocking.
    fn start_catchup(&self);

    /// Moves the node into participating mode.
    fn start_participating(&self);

    /// Notifies the node that the given instance has selected its primary.
    fn primary_selected(&self, instance_id: InstanceId);
}
