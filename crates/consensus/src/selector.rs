//! The view-change / primary-selection state machine.
//!
//! Primaries rotate round-robin over the pool ranks: the master primary of
//! view `v` is the node at rank `v mod n`, and instance `i` shifts that by
//! `i`. The selector gathers ViewChangeDone votes until `n - f` of them agree
//! on the expected primary and ledger state, then announces the selection to
//! every replica. Nodes joining late skip the vote and accept `f + 1`
//! matching CurrentState reports instead.

use crate::{
    ledger::{LedgerService, LedgerSummary},
    messages::{CurrentState, ViewChangeDone},
    replicas::Replicas,
    service::NodeService,
    InstanceId, NodeName, ReplicaName, ViewNumber,
};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What convinced the selector: a vote it took part in, or carried reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionBasis {
    ViewChangeDone,
    CurrentState,
}

impl fmt::Display for SelectionBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionBasis::ViewChangeDone => write!(f, "ViewChangeDone"),
            SelectionBasis::CurrentState => write!(f, "CurrentState"),
        }
    }
}

/// One sender's vote: the primary it proposes and the ledger state it claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChangeVote {
    pub proposed_primary: NodeName,
    pub ledger_summary: LedgerSummary,
}

/// Decides the primary of every instance, in round-robin fashion, once a
/// view change completes.
pub struct PrimarySelector {
    node: Arc<dyn NodeService>,
    ledgers: Arc<dyn LedgerService>,
    view_no: ViewNumber,
    /// Master primary of the immediately prior view; voting for it again is
    /// vetoed.
    previous_master_primary: Option<NodeName>,
    /// Latest vote per sender, in first-seen sender order.
    view_change_done: IndexMap<NodeName, ViewChangeVote>,
    /// Carried election results per view and sender, for the late-joiner path.
    current_state_messages: BTreeMap<ViewNumber, IndexMap<NodeName, ViewChangeDone>>,
    /// The first vote group that reached the view-change quorum; immutable
    /// for the rest of the view.
    accepted_view_change_done: Option<ViewChangeVote>,
    primary_verified: bool,
    has_view_change_from_primary: bool,
    has_acceptable_view_change_quorum: bool,
}

impl PrimarySelector {
    /// Creates a selector at view 0 with empty election state.
    pub fn new(node: Arc<dyn NodeService>, ledgers: Arc<dyn LedgerService>) -> Self {
        Self {
            node,
            ledgers,
            view_no: ViewNumber::default(),
            previous_master_primary: None,
            view_change_done: IndexMap::new(),
            current_state_messages: BTreeMap::new(),
            accepted_view_change_done: None,
            primary_verified: false,
            has_view_change_from_primary: false,
            has_acceptable_view_change_quorum: false,
        }
    }

    fn set_defaults(&mut self) {
        self.view_change_done.clear();
        self.current_state_messages.clear();
        self.accepted_view_change_done = None;
        self.primary_verified = false;
        self.has_view_change_from_primary = false;
        self.has_acceptable_view_change_quorum = false;
    }

    /// The selector's current view.
    pub fn view_no(&self) -> ViewNumber {
        self.view_no
    }

    /// Master primary of the prior view, while the veto is in force.
    pub fn previous_master_primary(&self) -> Option<&NodeName> {
        self.previous_master_primary.as_ref()
    }

    /// The vote group accepted for the current view, once one reached quorum.
    pub fn accepted_view_change_done(&self) -> Option<&ViewChangeVote> {
        self.accepted_view_change_done.as_ref()
    }

    /// Whether the accepted proposal matched the round-robin expectation.
    pub fn primary_verified(&self) -> bool {
        self.primary_verified
    }

    fn quorum(&self) -> usize {
        self.node.quorums().view_change_done.value()
    }

    fn state_quorum(&self) -> usize {
        self.node.quorums().current_state.value()
    }

    fn name(&self) -> NodeName {
        self.node.name()
    }

    /// Resets election state for a new view.
    ///
    /// Captures the outgoing master primary as the veto target, forgets every
    /// replica's primary and clears all counters and memoizations. View
    /// numbers that do not advance are ignored.
    pub fn view_change_started(&mut self, view_no: ViewNumber, replicas: &mut Replicas) -> bool {
        if view_no <= self.view_no {
            warn!(
                "{} ignoring view change to view {} since current view is {}",
                self.name(),
                view_no,
                self.view_no
            );
            return false;
        }

        self.view_no = view_no;
        self.previous_master_primary = replicas
            .master_replica()
            .and_then(|master| master.primary_name())
            .map(|primary| primary.node_name().clone());
        for replica in replicas.iter_mut() {
            replica.clear_primary();
        }
        self.set_defaults();
        true
    }

    /// Handles a ViewChangeDone from `sender`.
    ///
    /// Returns whether the vote was recorded; gated votes are dropped with a
    /// log line and nothing else changes.
    pub fn process_view_change_done(
        &mut self,
        msg: ViewChangeDone,
        sender: NodeName,
        replicas: &mut Replicas,
    ) -> bool {
        debug!(
            "{} processing ViewChangeDone from {} for view {}",
            self.name(),
            sender,
            msg.view_no
        );

        if msg.view_no != self.view_no {
            warn!(
                "{} got ViewChangeDone from {} for view {} whereas current view is {}",
                self.name(),
                sender,
                msg.view_no,
                self.view_no
            );
            return false;
        }

        if Some(&msg.name) == self.previous_master_primary.as_ref() {
            warn!(
                "{} got vote from {} for {} who was master primary in the previous view too",
                self.name(),
                sender,
                msg.name
            );
            return false;
        }

        if replicas
            .master_replica()
            .is_some_and(|master| master.primary_name().is_some())
        {
            debug!(
                "{} already decided master primary for view {}",
                self.name(),
                self.view_no
            );
            return false;
        }

        self.track_view_change_done(
            sender,
            ViewChangeVote {
                proposed_primary: msg.name,
                ledger_summary: msg.ledger_summary,
            },
        );
        self.start_selection(replicas);
        true
    }

    /// Handles a CurrentState from `sender`.
    ///
    /// A special case of primary selection in which this node does not take
    /// part in the vote but is notified of its outcome.
    pub fn process_current_state(
        &mut self,
        msg: CurrentState,
        sender: NodeName,
        replicas: &mut Replicas,
    ) -> bool {
        debug!(
            "{} processing CurrentState from {} for view {}",
            self.name(),
            sender,
            msg.view_no
        );

        if msg.view_no < self.view_no {
            warn!(
                "{} got CurrentState from {} for view {} whereas current view is {}",
                self.name(),
                sender,
                msg.view_no,
                self.view_no
            );
            return false;
        }

        let view_change_dones = match msg.view_change_dones() {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    "{} discarding CurrentState from {}: invalid election messages: {}",
                    self.name(),
                    sender,
                    e
                );
                return false;
            }
        };

        let Some(first) = view_change_dones.into_iter().next() else {
            debug!(
                "{} ignoring CurrentState from {} since it brought no ViewChangeDone messages",
                self.name(),
                sender
            );
            return false;
        };

        self.current_state_messages
            .entry(msg.view_no)
            .or_default()
            .insert(sender, first);
        self.start_current_state_selection(msg.view_no, replicas);
        true
    }

    /// Emits this node's ViewChangeDone for the master instance and attempts
    /// selection.
    ///
    /// The vote is emitted at most once per view: only while the node is
    /// synced and the master replica has no primary yet. The self-vote is
    /// recorded before the message is handed back for broadcast.
    pub fn decide_primaries(&mut self, replicas: &mut Replicas) -> Option<ViewChangeDone> {
        let mut outbound = None;
        if self.node.is_synced()
            && replicas
                .master_replica()
                .is_some_and(|master| master.is_primary().is_none())
        {
            outbound = self.compose_view_change_done();
        }
        self.start_selection(replicas);
        outbound
    }

    fn compose_view_change_done(&mut self) -> Option<ViewChangeDone> {
        let Some(new_primary) = self.next_primary_node_name(InstanceId::MASTER) else {
            error!(
                "{} cannot resolve the expected primary of view {}",
                self.name(),
                self.view_no
            );
            return None;
        };
        let ledger_summary = self.ledgers.ledger_summary();
        self.track_view_change_done(
            self.name(),
            ViewChangeVote {
                proposed_primary: new_primary.clone(),
                ledger_summary: ledger_summary.clone(),
            },
        );
        Some(ViewChangeDone::new(self.view_no, new_primary, ledger_summary))
    }

    /// The accepted ViewChangeDone of the current view for a catching-up
    /// peer, falling back to this node's own vote.
    pub fn get_msgs_for_lagged_nodes(&self) -> Vec<ViewChangeDone> {
        let vote = self
            .accepted_view_change_done
            .as_ref()
            .or_else(|| self.view_change_done.get(&self.name()));
        match vote {
            Some(vote) => vec![ViewChangeDone::new(
                self.view_no,
                vote.proposed_primary.clone(),
                vote.ledger_summary.clone(),
            )],
            None => {
                debug!(
                    "{} has no ViewChangeDone message to send for view {}",
                    self.name(),
                    self.view_no
                );
                Vec::new()
            }
        }
    }

    fn track_view_change_done(&mut self, sender: NodeName, vote: ViewChangeVote) {
        // A sender may revise its vote; the last value wins, the first-seen
        // position is kept for the tie-break.
        self.view_change_done.insert(sender, vote);
    }

    fn has_view_change_quorum(&self) -> bool {
        let ready = self.view_change_done.len();
        let quorum = self.quorum();
        if ready < quorum {
            debug!(
                "{} needs {} more ViewChangeDone messages",
                self.name(),
                quorum - ready
            );
            return false;
        }
        info!("{} got view change quorum ({} >= {})", self.name(), ready, quorum);
        true
    }

    fn check_view_change_from_primary(&mut self) -> bool {
        if !self.has_view_change_from_primary {
            let Some(next_primary) = self.next_primary_node_name(InstanceId::MASTER) else {
                return false;
            };
            if !self.view_change_done.contains_key(&next_primary) {
                debug!(
                    "{} has not received ViewChangeDone from the next primary {}",
                    self.name(),
                    next_primary
                );
                return false;
            }
            self.has_view_change_from_primary = true;
        }
        true
    }

    fn check_acceptable_view_change_quorum(&mut self) -> bool {
        if !self.has_acceptable_view_change_quorum {
            self.has_acceptable_view_change_quorum =
                self.has_view_change_quorum() && self.check_view_change_from_primary();
        }
        self.has_acceptable_view_change_quorum
    }

    /// Groups the gathered votes by `(primary, ledger summary)` and accepts
    /// the most popular group once it reaches quorum. Ties go to the group
    /// seen first. Once accepted, the choice is immutable for this view.
    fn sufficient_same_view_change_done(&mut self) -> Option<ViewChangeVote> {
        if self.accepted_view_change_done.is_none() && !self.view_change_done.is_empty() {
            let mut groups: Vec<(&ViewChangeVote, usize)> = Vec::new();
            for vote in self.view_change_done.values() {
                match groups.iter_mut().find(|(candidate, _)| *candidate == vote) {
                    Some(group) => group.1 += 1,
                    None => groups.push((vote, 1)),
                }
            }
            let (best, count) = groups
                .iter()
                .fold(None::<(&ViewChangeVote, usize)>, |best, group| match best {
                    Some((_, best_count)) if best_count >= group.1 => best,
                    _ => Some(*group),
                })
                .expect("groups is non-empty");

            if count >= self.quorum() {
                debug!(
                    "{} found acceptable primary {} with ledger info {}",
                    self.name(),
                    best.proposed_primary,
                    best.ledger_summary
                );
                self.accepted_view_change_done = Some(best.clone());
            } else {
                debug!(
                    "{} does not have an acceptable primary, only {} votes for {}",
                    self.name(),
                    count,
                    best.proposed_primary
                );
            }
        }
        self.accepted_view_change_done.clone()
    }

    fn verify_view_change(&mut self) -> bool {
        if !self.check_acceptable_view_change_quorum() {
            return false;
        }
        let Some(vote) = self.sufficient_same_view_change_done() else {
            return false;
        };
        self.verify_primary(&vote.proposed_primary)
    }

    fn verify_primary(&mut self, new_primary: &NodeName) -> bool {
        let Some(expected_primary) = self.next_primary_node_name(InstanceId::MASTER) else {
            error!(
                "{} cannot resolve the expected primary of view {}",
                self.name(),
                self.view_no
            );
            return false;
        };
        if *new_primary != expected_primary {
            error!(
                "{} expected next primary to be {}, but majority declared {} instead for view {}",
                self.name(),
                expected_primary,
                new_primary,
                self.view_no
            );
            return false;
        }
        self.primary_verified = true;
        true
    }

    fn is_behind_for_view(&self, accepted_ledger_summary: &LedgerSummary) -> bool {
        self.ledgers
            .ledger_summary()
            .is_behind(accepted_ledger_summary)
    }

    fn start_selection(&mut self, replicas: &mut Replicas) {
        if !self.verify_view_change() {
            debug!(
                "{} cannot start primary selection: no acceptable ViewChangeDone quorum yet",
                self.name()
            );
            return;
        }

        if !self.node.is_synced() {
            info!(
                "{} cannot start primary selection since mode is {}",
                self.name(),
                self.node.mode()
            );
            return;
        }

        let Some(accepted) = self.accepted_view_change_done.clone() else {
            return;
        };
        if self.is_behind_for_view(&accepted.ledger_summary) {
            info!(
                "{} is synced and has an acceptable view change quorum but is behind the accepted state",
                self.name()
            );
            self.node.start_catchup();
            return;
        }

        debug!("{} starting selection", self.name());
        for index in 0..replicas.len() {
            let instance_id = InstanceId::new(index as u16);
            if replicas
                .get(instance_id)
                .is_some_and(|replica| replica.primary_name().is_some())
            {
                debug!(
                    "{} instance {} already has a primary",
                    self.name(),
                    instance_id
                );
                continue;
            }
            let Some(new_primary) = self.next_primary_replica_name(instance_id) else {
                error!(
                    "{} cannot resolve the primary of instance {} for view {}",
                    self.name(),
                    instance_id,
                    self.view_no
                );
                return;
            };
            self.declare_selection_completed(
                replicas,
                instance_id,
                new_primary,
                SelectionBasis::ViewChangeDone,
            );
        }
    }

    fn has_state_quorum(&self, view_no: ViewNumber) -> bool {
        let Some(messages) = self.current_state_messages.get(&view_no) else {
            return false;
        };
        let mut counts: Vec<(&NodeName, usize)> = Vec::new();
        for done in messages.values() {
            match counts.iter_mut().find(|(name, _)| *name == &done.name) {
                Some(entry) => entry.1 += 1,
                None => counts.push((&done.name, 1)),
            }
        }
        let Some((name, popularity)) =
            counts
                .iter()
                .fold(None::<(&NodeName, usize)>, |best, entry| match best {
                    Some((_, best_count)) if best_count >= entry.1 => best,
                    _ => Some(*entry),
                })
        else {
            return false;
        };

        let state_quorum = self.state_quorum();
        if popularity < state_quorum {
            debug!(
                "{} needs {} more CurrentState messages to change state",
                self.name(),
                state_quorum - popularity
            );
            return false;
        }
        info!(
            "{} got quorum of CurrentState messages for {} ({} >= {})",
            self.name(),
            name,
            popularity,
            state_quorum
        );
        true
    }

    fn start_current_state_selection(&mut self, view_no: ViewNumber, replicas: &mut Replicas) {
        if !self.has_state_quorum(view_no) {
            debug!(
                "{} cannot update current state: not enough CurrentState messages from other nodes",
                self.name()
            );
            return;
        }

        if !self.node.is_synced() {
            info!(
                "{} cannot start primary selection since mode is {}",
                self.name(),
                self.node.mode()
            );
            return;
        }

        let Some(message) = self
            .current_state_messages
            .get(&view_no)
            .and_then(|messages| messages.values().next().cloned())
        else {
            return;
        };
        if self.is_behind_for_view(&message.ledger_summary) {
            info!(
                "{} learned an accepted election result but is behind the accepted state",
                self.name()
            );
            self.node.start_catchup();
            return;
        }

        debug!("{} starting selection of state", self.name());
        self.view_change_started(view_no, replicas);
        for index in 0..replicas.len() {
            let instance_id = InstanceId::new(index as u16);
            let Some(new_primary) = self.primary_replica_name_for_view(instance_id, view_no)
            else {
                error!(
                    "{} cannot resolve the primary of instance {} for view {}",
                    self.name(),
                    instance_id,
                    view_no
                );
                return;
            };
            self.declare_selection_completed(
                replicas,
                instance_id,
                new_primary,
                SelectionBasis::CurrentState,
            );
        }
    }

    fn declare_selection_completed(
        &mut self,
        replicas: &mut Replicas,
        instance_id: InstanceId,
        new_primary: ReplicaName,
        basis: SelectionBasis,
    ) {
        info!(
            "{} selected primary {} for instance {} (view {}) on the basis of {}",
            self.name(),
            new_primary,
            instance_id,
            self.view_no,
            basis
        );

        if instance_id.is_master() {
            self.previous_master_primary = None;
            // The replica starts processing stashed requests as soon as it
            // learns its primary, so the node must be participating first.
            self.node.start_participating();
        }

        if let Some(replica) = replicas.get_mut(instance_id) {
            replica.primary_changed(new_primary);
        }
        self.node.primary_selected(instance_id);
    }

    fn primary_id_for_view(&self, view_no: ViewNumber, instance_id: InstanceId) -> Option<usize> {
        let total = self.node.total_nodes();
        if total == 0 {
            return None;
        }
        Some(((view_no.value() + instance_id.value() as u64) % total as u64) as usize)
    }

    /// Node name of the primary of `instance_id` for `view_no`, by the
    /// round-robin rule.
    pub fn primary_node_name_for_view(
        &self,
        instance_id: InstanceId,
        view_no: ViewNumber,
    ) -> Option<NodeName> {
        let rank = self.primary_id_for_view(view_no, instance_id)?;
        self.node.get_name_by_rank(rank)
    }

    /// Replica name of the primary of `instance_id` for `view_no`.
    pub fn primary_replica_name_for_view(
        &self,
        instance_id: InstanceId,
        view_no: ViewNumber,
    ) -> Option<ReplicaName> {
        self.primary_node_name_for_view(instance_id, view_no)
            .map(|node_name| ReplicaName::new(node_name, instance_id))
    }

    /// Node name of the primary of `instance_id` for the current view.
    pub fn next_primary_node_name(&self, instance_id: InstanceId) -> Option<NodeName> {
        self.primary_node_name_for_view(instance_id, self.view_no)
    }

    /// Replica name of the primary of `instance_id` for the current view.
    pub fn next_primary_replica_name(&self, instance_id: InstanceId) -> Option<ReplicaName> {
        self.primary_replica_name_for_view(instance_id, self.view_no)
    }
}
