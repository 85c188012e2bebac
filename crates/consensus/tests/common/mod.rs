//! Shared test doubles for the consensus integration tests.

#![allow(dead_code)]

use parking_lot::RwLock;
use sovra_consensus::{
    BlsBftFactory, BlsProvider, InstanceId, LedgerId, LedgerInfo, LedgerRegistry, LedgerSummary,
    NodeMode, NodeName, NodeService, PrimarySelector, Quorums, Replica, ReplicaFactory,
    ReplicaMessage, ReplicaName, ReplicaOutput, Replicas, ViewChangeDone, ViewNumber,
};
use sovra_core::Hash256;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

/// Node double recording every side effect the selector triggers.
pub struct MockNode {
    name: NodeName,
    pool: Vec<NodeName>,
    pub mode: RwLock<NodeMode>,
    pub catchup_requests: RwLock<usize>,
    pub participating: RwLock<bool>,
    pub primaries_selected: RwLock<Vec<InstanceId>>,
}

impl MockNode {
    pub fn new(name: &str, pool: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: NodeName::from(name),
            pool: pool.iter().map(|n| NodeName::from(*n)).collect(),
            mode: RwLock::new(NodeMode::Synced),
            catchup_requests: RwLock::new(0),
            participating: RwLock::new(false),
            primaries_selected: RwLock::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: NodeMode) {
        *self.mode.write() = mode;
    }
}

impl NodeService for MockNode {
    fn name(&self) -> NodeName {
        self.name.clone()
    }

    fn total_nodes(&self) -> usize {
        self.pool.len()
    }

    fn mode(&self) -> NodeMode {
        *self.mode.read()
    }

    fn get_name_by_rank(&self, rank: usize) -> Option<NodeName> {
        self.pool.get(rank).cloned()
    }

    fn quorums(&self) -> Quorums {
        Quorums::new(self.pool.len())
    }

    fn start_catchup(&self) {
        *self.catchup_requests.write() += 1;
    }

    fn start_participating(&self) {
        *self.participating.write() = true;
        *self.mode.write() = NodeMode::Participating;
    }

    fn primary_selected(&self, instance_id: InstanceId) {
        self.primaries_selected.write().push(instance_id);
    }
}

/// Minimal replica: queues plus a primary slot, no ordering logic.
pub struct TestReplica {
    name: ReplicaName,
    primary: Option<ReplicaName>,
    inbox: VecDeque<ReplicaMessage>,
    outbox: VecDeque<ReplicaOutput>,
    processed_log: Arc<RwLock<Vec<(InstanceId, ReplicaMessage)>>>,
    ledger_log: Arc<RwLock<Vec<(InstanceId, LedgerId)>>>,
}

impl Replica for TestReplica {
    fn name(&self) -> &ReplicaName {
        &self.name
    }

    fn instance_id(&self) -> InstanceId {
        self.name.instance_id()
    }

    fn primary_name(&self) -> Option<&ReplicaName> {
        self.primary.as_ref()
    }

    fn primary_changed(&mut self, new_primary: ReplicaName) {
        self.primary = Some(new_primary);
    }

    fn clear_primary(&mut self) {
        self.primary = None;
    }

    fn register_ledger(&mut self, ledger_id: LedgerId) {
        self.ledger_log.write().push((self.instance_id(), ledger_id));
    }

    fn inbox(&self) -> &VecDeque<ReplicaMessage> {
        &self.inbox
    }

    fn inbox_mut(&mut self) -> &mut VecDeque<ReplicaMessage> {
        &mut self.inbox
    }

    fn outbox(&self) -> &VecDeque<ReplicaOutput> {
        &self.outbox
    }

    fn outbox_mut(&mut self) -> &mut VecDeque<ReplicaOutput> {
        &mut self.outbox
    }

    fn service_queues(&mut self, limit: Option<usize>) -> usize {
        let mut processed = 0;
        while limit.map_or(true, |l| processed < l) {
            let Some(message) = self.inbox.pop_front() else {
                break;
            };
            self.processed_log
                .write()
                .push((self.instance_id(), message));
            processed += 1;
        }
        processed
    }
}

/// Factory handing out [`TestReplica`]s that report into shared logs.
#[derive(Default)]
pub struct TestReplicaFactory {
    pub processed_log: Arc<RwLock<Vec<(InstanceId, ReplicaMessage)>>>,
    pub ledger_log: Arc<RwLock<Vec<(InstanceId, LedgerId)>>>,
}

impl ReplicaFactory for TestReplicaFactory {
    fn new_replica(&self, name: ReplicaName, _is_master: bool) -> Box<dyn Replica> {
        Box::new(TestReplica {
            name,
            primary: None,
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
            processed_log: Arc::clone(&self.processed_log),
            ledger_log: Arc::clone(&self.ledger_log),
        })
    }
}

/// A BLS factory pointing at a directory that holds no keys.
pub fn keyless_bls_factory(node: &str) -> BlsBftFactory {
    BlsBftFactory::new(
        BlsProvider::Indy {
            keys_dir: PathBuf::from("/nonexistent/bls-keys"),
        },
        NodeName::from(node),
    )
}

/// Builds a replica collection with `instances` replicas for `node`.
pub fn replicas_for(node: &str, instances: usize) -> Replicas {
    let mut replicas = Replicas::new(
        NodeName::from(node),
        Box::new(TestReplicaFactory::default()),
        keyless_bls_factory(node),
    );
    for _ in 0..instances {
        replicas.grow().unwrap();
    }
    replicas
}

/// A registry with one domain ledger of the given size.
pub fn ledgers_with_size(size: u64) -> Arc<RwLock<LedgerRegistry>> {
    let mut registry = LedgerRegistry::new();
    registry.register_ledger(LedgerId::new(1)).unwrap();
    registry
        .set_ledger_state(LedgerId::new(1), size, Hash256::from([7u8; 32]))
        .unwrap();
    Arc::new(RwLock::new(registry))
}

/// The summary a sender with a ledger of `size` transactions would claim.
pub fn summary_with_size(size: u64) -> LedgerSummary {
    LedgerSummary::new(vec![LedgerInfo::new(
        LedgerId::new(1),
        size,
        Hash256::from([7u8; 32]),
    )])
}

/// A ViewChangeDone proposing `primary` with a ledger of `size` entries.
pub fn vote(view: u64, primary: &str, size: u64) -> ViewChangeDone {
    ViewChangeDone::new(
        ViewNumber::new(view),
        NodeName::from(primary),
        summary_with_size(size),
    )
}

/// Standard 4-node fixture: selector for `node` with `instances` replicas.
pub fn setup(
    node: &str,
    instances: usize,
) -> (Arc<MockNode>, Arc<RwLock<LedgerRegistry>>, Replicas, PrimarySelector) {
    init_tracing();
    let mock = MockNode::new(node, &["A", "B", "C", "D"]);
    let ledgers = ledgers_with_size(10);
    let replicas = replicas_for(node, instances);
    let selector = PrimarySelector::new(mock.clone(), ledgers.clone());
    (mock, ledgers, replicas, selector)
}

/// Installs the fmt subscriber once so `RUST_LOG` works in tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
