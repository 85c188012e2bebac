//! The per-instance replicas of a node and their message fan-out.
//!
//! A node runs one replica per protocol instance; index 0 is the master and
//! the rest are backups. The collection owns the inbound queues and drains
//! outboxes under a fair per-replica budget.

use crate::{
    bls::{BlsBft, BlsBftFactory},
    ledger::LedgerId,
    messages::{Ordered, ReplicaMessage, ReplicaOutput},
    Error, InstanceId, NodeName, ReplicaName, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::Index;
use tracing::{debug, info, warn};

/// The contract a replica implementation offers to the collection.
///
/// Replicas own their queues; the collection only touches them through these
/// methods, from the single event loop.
pub trait Replica {
    /// The replica's derived name, `"{node}:{instance}"`.
    fn name(&self) -> &ReplicaName;

    /// The instance this replica runs.
    fn instance_id(&self) -> InstanceId;

    /// Name of the replica's current primary; `None` while undecided.
    fn primary_name(&self) -> Option<&ReplicaName>;

    /// Whether this replica is itself primary; `None` while undecided.
    fn is_primary(&self) -> Option<bool> {
        self.primary_name().map(|primary| primary == self.name())
    }

    /// Installs a newly selected primary.
    fn primary_changed(&mut self, new_primary: ReplicaName);

    /// Forgets the current primary at the start of a view change.
    fn clear_primary(&mut self);

    /// Makes the replica track a newly registered ledger.
    fn register_ledger(&mut self, ledger_id: LedgerId);

    /// Inbound queue of three-phase messages.
    fn inbox(&self) -> &VecDeque<ReplicaMessage>;

    /// Mutable access to the inbound queue.
    fn inbox_mut(&mut self) -> &mut VecDeque<ReplicaMessage>;

    /// Outbound queue of protocol messages and Ordered notifications.
    fn outbox(&self) -> &VecDeque<ReplicaOutput>;

    /// Mutable access to the outbound queue.
    fn outbox_mut(&mut self) -> &mut VecDeque<ReplicaOutput>;

    /// Processes up to `limit` inbound messages; returns how many were
    /// actually processed.
    fn service_queues(&mut self, limit: Option<usize>) -> usize;
}

/// Creates replica implementations for the collection.
pub trait ReplicaFactory {
    /// Builds the replica for the given name; `is_master` is true exactly for
    /// instance 0.
    fn new_replica(&self, name: ReplicaName, is_master: bool) -> Box<dyn Replica>;
}

/// Counters over the lifetime of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicasStats {
    /// Instances added by `grow`.
    pub instances_added: u64,
    /// Instances removed by `shrink`.
    pub instances_removed: u64,
    /// Messages enqueued through `pass_message`.
    pub messages_passed: u64,
    /// Messages processed through `service_inboxes`.
    pub messages_processed: u64,
}

/// The replicas of one node, ordered by instance id.
pub struct Replicas {
    node_name: NodeName,
    factory: Box<dyn ReplicaFactory>,
    bls_factory: BlsBftFactory,
    replicas: Vec<Box<dyn Replica>>,
    messages_to_replicas: Vec<VecDeque<ReplicaMessage>>,
    bls_bfts: Vec<Option<BlsBft>>,
    stats: ReplicasStats,
}

impl Replicas {
    /// Creates an empty collection for the given node.
    pub fn new(
        node_name: NodeName,
        factory: Box<dyn ReplicaFactory>,
        bls_factory: BlsBftFactory,
    ) -> Self {
        Self {
            node_name,
            factory,
            bls_factory,
            replicas: Vec::new(),
            messages_to_replicas: Vec::new(),
            bls_bfts: Vec::new(),
            stats: ReplicasStats::default(),
        }
    }

    /// Appends a replica at the next instance index and returns the new
    /// count. The first replica created is the master.
    pub fn grow(&mut self) -> Result<usize> {
        let instance_id = InstanceId::new(self.replicas.len() as u16);
        let is_master = instance_id.is_master();

        let bls_bft = match self.bls_factory.create_bls_bft(is_master) {
            Ok(bls) => Some(bls),
            Err(Error::MissingBlsKeys { .. }) => {
                warn!(
                    "{} has no BLS keys; replica for instance {} continues without BLS",
                    self.node_name, instance_id
                );
                None
            }
            Err(e) => return Err(e),
        };

        let name = ReplicaName::new(self.node_name.clone(), instance_id);
        let replica = self.factory.new_replica(name, is_master);

        info!(
            "{} added replica {} to instance {} ({})",
            self.node_name,
            replica.name(),
            instance_id,
            if is_master { "master" } else { "backup" }
        );

        self.replicas.push(replica);
        self.messages_to_replicas.push(VecDeque::new());
        self.bls_bfts.push(bls_bft);
        self.stats.instances_added += 1;
        Ok(self.len())
    }

    /// Removes the tail replica and returns the new count.
    pub fn shrink(&mut self) -> Result<usize> {
        let replica = self.replicas.pop().ok_or(Error::NoReplicas)?;
        self.messages_to_replicas.pop();
        self.bls_bfts.pop();
        self.stats.instances_removed += 1;

        info!(
            "{} removed replica {} from instance {}",
            self.node_name,
            replica.name(),
            replica.instance_id()
        );
        Ok(self.len())
    }

    /// Enqueues a message for one replica, or for every replica when
    /// `instance_id` is `None`. Delivery is enqueue-only; nothing is
    /// processed until `service_inboxes`.
    pub fn pass_message(&mut self, message: ReplicaMessage, instance_id: Option<InstanceId>) {
        match instance_id {
            Some(id) => match self.messages_to_replicas.get_mut(id.value() as usize) {
                Some(queue) => {
                    queue.push_back(message);
                    self.stats.messages_passed += 1;
                }
                None => debug!(
                    "{} dropping message for unknown instance {}",
                    self.node_name, id
                ),
            },
            None => {
                for queue in &mut self.messages_to_replicas {
                    queue.push_back(message.clone());
                    self.stats.messages_passed += 1;
                }
            }
        }
    }

    /// Moves queued messages into each replica's inbox and lets every replica
    /// process up to `limit` of them. Returns the number processed.
    pub fn service_inboxes(&mut self, limit: Option<usize>) -> usize {
        let mut processed = 0;
        for (replica, queue) in self.replicas.iter_mut().zip(&mut self.messages_to_replicas) {
            while let Some(message) = queue.pop_front() {
                replica.inbox_mut().push_back(message);
            }
            processed += replica.service_queues(limit);
        }
        self.stats.messages_processed += processed as u64;
        processed
    }

    /// Drains outbound messages, at most `round(limit / n)` per replica.
    ///
    /// A budget that rounds to zero with a positive `limit` is forcibly
    /// raised to one.
    pub fn get_output(&mut self, limit: Option<usize>) -> Vec<ReplicaOutput> {
        let per_replica = match limit {
            None => None,
            Some(limit) => {
                if self.replicas.is_empty() {
                    return Vec::new();
                }
                let mut per =
                    (limit as f64 / self.replicas.len() as f64).round() as usize;
                if per == 0 && limit > 0 {
                    warn!(
                        "{} forcibly setting replica message limit to 1",
                        self.node_name
                    );
                    per = 1;
                }
                Some(per)
            }
        };

        let mut output = Vec::new();
        if per_replica == Some(0) {
            return output;
        }
        for replica in &mut self.replicas {
            let mut num = 0;
            while let Some(message) = replica.outbox_mut().pop_front() {
                output.push(message);
                num += 1;
                if per_replica.is_some_and(|per| num >= per) {
                    break;
                }
            }
        }
        output
    }

    /// Takes all Ordered messages from every outbox out of turn, preserving
    /// the relative order of the remaining messages.
    pub fn take_ordereds_out_of_turn(&mut self) -> Vec<(InstanceId, Vec<Ordered>)> {
        let mut result = Vec::with_capacity(self.replicas.len());
        for replica in &mut self.replicas {
            let instance_id = replica.instance_id();
            let outbox = replica.outbox_mut();
            let mut ordereds = Vec::new();
            let mut rest = VecDeque::with_capacity(outbox.len());
            while let Some(message) = outbox.pop_front() {
                match message {
                    ReplicaOutput::Ordered(ordered) => ordereds.push(ordered),
                    other => rest.push_back(other),
                }
            }
            *outbox = rest;
            result.push((instance_id, ordereds));
        }
        result
    }

    /// Tells every replica about a newly registered ledger.
    pub fn register_new_ledger(&mut self, ledger_id: LedgerId) {
        for replica in &mut self.replicas {
            replica.register_ledger(ledger_id);
        }
    }

    /// Instance id of any replica that is itself primary.
    pub fn some_replica_has_primary(&self) -> Option<InstanceId> {
        self.replicas
            .iter()
            .find(|replica| replica.is_primary() == Some(true))
            .map(|replica| replica.instance_id())
    }

    /// Whether the master replica is primary; `None` while undecided or when
    /// no replicas exist.
    pub fn master_replica_is_primary(&self) -> Option<bool> {
        self.master_replica().and_then(|master| master.is_primary())
    }

    /// Whether every replica has a selected primary.
    pub fn all_instances_have_primary(&self) -> bool {
        self.replicas
            .iter()
            .all(|replica| replica.primary_name().is_some())
    }

    /// Total number of inbound messages not yet processed.
    pub fn sum_inbox_len(&self) -> usize {
        let queued: usize = self.messages_to_replicas.iter().map(VecDeque::len).sum();
        let inboxed: usize = self.replicas.iter().map(|r| r.inbox().len()).sum();
        queued + inboxed
    }

    /// The master replica, if any replica exists.
    pub fn master_replica(&self) -> Option<&dyn Replica> {
        self.get(InstanceId::MASTER)
    }

    /// Gets a replica by instance id.
    pub fn get(&self, instance_id: InstanceId) -> Option<&dyn Replica> {
        self.replicas
            .get(instance_id.value() as usize)
            .map(|replica| &**replica)
    }

    /// Gets a replica by instance id, mutably.
    pub fn get_mut(&mut self, instance_id: InstanceId) -> Option<&mut (dyn Replica + 'static)> {
        self.replicas
            .get_mut(instance_id.value() as usize)
            .map(|replica| &mut **replica)
    }

    /// Iterates the replicas in instance order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Replica> {
        self.replicas.iter().map(|replica| &**replica)
    }

    /// Iterates the replicas in instance order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn Replica + 'static)> {
        self.replicas.iter_mut().map(|replica| &mut **replica)
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// The BLS helper of an instance; `None` when the node has no keys.
    pub fn bls_bft(&self, instance_id: InstanceId) -> Option<&BlsBft> {
        self.bls_bfts
            .get(instance_id.value() as usize)
            .and_then(Option::as_ref)
    }

    /// Lifetime counters of this collection.
    pub fn stats(&self) -> &ReplicasStats {
        &self.stats
    }
}

impl Index<usize> for Replicas {
    type Output = dyn Replica;

    fn index(&self, index: usize) -> &Self::Output {
        &*self.replicas[index]
    }
}
