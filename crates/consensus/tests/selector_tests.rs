//! Election scenarios for the primary selector on a 4-node pool.
//!
//! Pool `{A, B, C, D}` has ranks `0..3`, so `f = 1`, the view-change quorum
//! is 3 and the current-state quorum is 2. The master primary of view `v` is
//! the node at rank `v mod 4`.

mod common;

use common::{setup, summary_with_size, vote};
use sovra_consensus::{
    CurrentState, InstanceId, NodeMode, NodeName, ViewChangeDone, ViewNumber,
};

fn node_name(name: &str) -> NodeName {
    NodeName::from(name)
}

fn advance_to_view_1(
    selector: &mut sovra_consensus::PrimarySelector,
    replicas: &mut sovra_consensus::Replicas,
) {
    assert!(selector.view_change_started(ViewNumber::new(1), replicas));
}

#[test]
fn rotation_from_view_0_to_1() {
    let (mock, _ledgers, mut replicas, mut selector) = setup("A", 2);
    advance_to_view_1(&mut selector, &mut replicas);

    // Two agreeing votes are one short of the quorum of three.
    assert!(selector.process_view_change_done(vote(1, "B", 10), node_name("A"), &mut replicas));
    assert!(selector.process_view_change_done(vote(1, "B", 10), node_name("B"), &mut replicas));
    assert!(!replicas.all_instances_have_primary());
    assert!(mock.primaries_selected.read().is_empty());

    // The third vote completes the election.
    assert!(selector.process_view_change_done(vote(1, "B", 10), node_name("C"), &mut replicas));

    let accepted = selector.accepted_view_change_done().unwrap();
    assert_eq!(accepted.proposed_primary, node_name("B"));
    assert_eq!(accepted.ledger_summary, summary_with_size(10));
    assert!(selector.primary_verified());

    // Every instance's primary rotates from B's rank.
    assert_eq!(
        replicas.get(InstanceId::new(0)).unwrap().primary_name().unwrap().to_string(),
        "B:0"
    );
    assert_eq!(
        replicas.get(InstanceId::new(1)).unwrap().primary_name().unwrap().to_string(),
        "C:1"
    );
    assert!(replicas.all_instances_have_primary());

    // Master selection put the node into participating mode.
    assert!(*mock.participating.read());
    assert_eq!(
        *mock.primaries_selected.read(),
        vec![InstanceId::new(0), InstanceId::new(1)]
    );
}

#[test]
fn quorum_without_expected_primary_vote_waits() {
    let (mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    advance_to_view_1(&mut selector, &mut replicas);

    // Three votes, but none of them from B, the expected primary of view 1.
    for sender in ["A", "C", "D"] {
        selector.process_view_change_done(vote(1, "B", 10), node_name(sender), &mut replicas);
    }
    assert!(!replicas.all_instances_have_primary());
    assert!(mock.primaries_selected.read().is_empty());

    // B's own vote arrives and the election completes.
    selector.process_view_change_done(vote(1, "B", 10), node_name("B"), &mut replicas);
    assert!(replicas.all_instances_have_primary());
}

#[test]
fn vetoes_previous_master_primary() {
    let (_mock, _ledgers, mut replicas, mut selector) = setup("A", 1);

    // View 0 elects A (rank 0).
    for sender in ["A", "B", "C"] {
        selector.process_view_change_done(vote(0, "A", 10), node_name(sender), &mut replicas);
    }
    assert_eq!(
        replicas.master_replica().unwrap().primary_name().unwrap().to_string(),
        "A:0"
    );

    // The view change deposes A and remembers it as the veto target.
    assert!(selector.view_change_started(ViewNumber::new(1), &mut replicas));
    assert_eq!(selector.previous_master_primary(), Some(&node_name("A")));
    assert!(replicas.master_replica().unwrap().primary_name().is_none());

    // A vote to re-elect the deposed primary is dropped.
    assert!(!selector.process_view_change_done(vote(1, "A", 10), node_name("D"), &mut replicas));
    assert!(selector.accepted_view_change_done().is_none());

    // Votes for the expected rotation succeed.
    for sender in ["A", "B", "C"] {
        selector.process_view_change_done(vote(1, "B", 10), node_name(sender), &mut replicas);
    }
    assert_eq!(
        replicas.master_replica().unwrap().primary_name().unwrap().to_string(),
        "B:0"
    );
    // The veto dissolves once a new master primary is announced.
    assert_eq!(selector.previous_master_primary(), None);
}

#[test]
fn behind_accepted_state_triggers_catchup() {
    let (mock, ledgers, mut replicas, mut selector) = setup("A", 1);
    advance_to_view_1(&mut selector, &mut replicas);

    // Local ledger holds 9 transactions; the quorum claims 10.
    ledgers
        .write()
        .set_ledger_state(
            sovra_consensus::LedgerId::new(1),
            9,
            sovra_core::Hash256::from([7u8; 32]),
        )
        .unwrap();

    for sender in ["A", "B", "C"] {
        selector.process_view_change_done(vote(1, "B", 10), node_name(sender), &mut replicas);
    }

    // The vote was accepted but nothing was announced; a catchup was
    // requested instead.
    assert!(selector.accepted_view_change_done().is_some());
    assert!(!replicas.all_instances_have_primary());
    assert!(mock.primaries_selected.read().is_empty());
    assert_eq!(*mock.catchup_requests.read(), 1);

    // Once caught up, the next attempt completes the election.
    ledgers
        .write()
        .set_ledger_state(
            sovra_consensus::LedgerId::new(1),
            10,
            sovra_core::Hash256::from([7u8; 32]),
        )
        .unwrap();
    selector.decide_primaries(&mut replicas);
    assert!(replicas.all_instances_have_primary());
}

#[test]
fn late_joiner_accepts_current_state_quorum() {
    let (mock, _ledgers, mut replicas, mut selector) = setup("D", 2);

    let carried = vote(2, "C", 10);
    let state = CurrentState::new(ViewNumber::new(2), std::slice::from_ref(&carried)).unwrap();

    // One report is below the current-state quorum of two.
    assert!(selector.process_current_state(state.clone(), node_name("A"), &mut replicas));
    assert!(!replicas.all_instances_have_primary());

    // The second report fires the late-joiner selection.
    assert!(selector.process_current_state(state, node_name("B"), &mut replicas));
    assert_eq!(selector.view_no(), ViewNumber::new(2));
    assert_eq!(
        replicas.get(InstanceId::new(0)).unwrap().primary_name().unwrap().to_string(),
        "C:0"
    );
    assert_eq!(
        replicas.get(InstanceId::new(1)).unwrap().primary_name().unwrap().to_string(),
        "D:1"
    );
    assert!(*mock.participating.read());
}

#[test]
fn current_state_below_quorum_or_stale_is_ignored() {
    let (_mock, _ledgers, mut replicas, mut selector) = setup("D", 1);
    selector.view_change_started(ViewNumber::new(3), &mut replicas);

    // Stale view: dropped outright.
    let carried = vote(2, "C", 10);
    let stale = CurrentState::new(ViewNumber::new(2), std::slice::from_ref(&carried)).unwrap();
    assert!(!selector.process_current_state(stale, node_name("A"), &mut replicas));

    // Current view but only one sender: recorded, not acted on.
    let carried = vote(3, "D", 10);
    let state = CurrentState::new(ViewNumber::new(3), std::slice::from_ref(&carried)).unwrap();
    assert!(selector.process_current_state(state, node_name("A"), &mut replicas));
    assert!(!replicas.all_instances_have_primary());
}

#[test]
fn malformed_current_state_is_discarded_whole() {
    let (_mock, _ledgers, mut replicas, mut selector) = setup("D", 1);

    let carried = vote(0, "A", 10);
    let mut state = CurrentState::new(ViewNumber::new(0), std::slice::from_ref(&carried)).unwrap();
    state.primary.push(vec![0xff, 0x00, 0x12]);

    assert!(!selector.process_current_state(state, node_name("A"), &mut replicas));
    assert!(!replicas.all_instances_have_primary());
}

#[test]
fn wrong_view_vote_is_dropped() {
    let (_mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    assert!(!selector.process_view_change_done(vote(5, "B", 10), node_name("B"), &mut replicas));
    assert!(selector.accepted_view_change_done().is_none());
}

#[test]
fn revised_vote_overwrites_and_duplicate_is_idempotent() {
    let (_mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    advance_to_view_1(&mut selector, &mut replicas);

    // B first votes for C, then revises to B; the last value wins and the
    // sender is counted once.
    selector.process_view_change_done(vote(1, "C", 10), node_name("B"), &mut replicas);
    selector.process_view_change_done(vote(1, "B", 10), node_name("B"), &mut replicas);
    selector.process_view_change_done(vote(1, "B", 10), node_name("B"), &mut replicas);
    assert!(selector.accepted_view_change_done().is_none());

    selector.process_view_change_done(vote(1, "B", 10), node_name("A"), &mut replicas);
    selector.process_view_change_done(vote(1, "B", 10), node_name("C"), &mut replicas);

    let accepted = selector.accepted_view_change_done().unwrap();
    assert_eq!(accepted.proposed_primary, node_name("B"));
    assert!(replicas.all_instances_have_primary());
}

#[test]
fn unexpected_majority_primary_does_not_announce() {
    let (mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    advance_to_view_1(&mut selector, &mut replicas);

    // A quorum including B agrees on C, but view 1 expects B.
    for sender in ["A", "B", "C"] {
        selector.process_view_change_done(vote(1, "C", 10), node_name(sender), &mut replicas);
    }

    assert!(!replicas.all_instances_have_primary());
    assert!(mock.primaries_selected.read().is_empty());

    // The accepted pair is immutable for the rest of the view, even as more
    // votes arrive.
    let accepted = selector.accepted_view_change_done().unwrap().clone();
    assert_eq!(accepted.proposed_primary, node_name("C"));
    selector.process_view_change_done(vote(1, "B", 10), node_name("D"), &mut replicas);
    assert_eq!(
        selector.accepted_view_change_done().unwrap().proposed_primary,
        node_name("C")
    );
}

#[test]
fn unsynced_node_does_not_announce() {
    let (mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    advance_to_view_1(&mut selector, &mut replicas);
    mock.set_mode(NodeMode::Syncing);

    for sender in ["A", "B", "C"] {
        selector.process_view_change_done(vote(1, "B", 10), node_name(sender), &mut replicas);
    }
    assert!(!replicas.all_instances_have_primary());

    // Catching up finishes; the next decision round announces.
    mock.set_mode(NodeMode::Synced);
    selector.decide_primaries(&mut replicas);
    assert!(replicas.all_instances_have_primary());
}

#[test]
fn decide_primaries_emits_self_vote_once() {
    let (mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    advance_to_view_1(&mut selector, &mut replicas);

    let outbound = selector.decide_primaries(&mut replicas).unwrap();
    assert_eq!(outbound.view_no, ViewNumber::new(1));
    assert_eq!(outbound.name, node_name("B"));
    assert_eq!(outbound.ledger_summary, summary_with_size(10));

    // The self-vote was recorded and is offered to lagged nodes.
    assert_eq!(selector.get_msgs_for_lagged_nodes(), vec![outbound]);

    // An unsynced node emits nothing.
    mock.set_mode(NodeMode::Syncing);
    assert!(selector.decide_primaries(&mut replicas).is_none());
}

#[test]
fn lagged_node_messages_prefer_the_accepted_vote() {
    let (_mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    assert!(selector.get_msgs_for_lagged_nodes().is_empty());

    advance_to_view_1(&mut selector, &mut replicas);
    for sender in ["A", "B", "C"] {
        selector.process_view_change_done(vote(1, "B", 10), node_name(sender), &mut replicas);
    }

    let messages = selector.get_msgs_for_lagged_nodes();
    assert_eq!(
        messages,
        vec![ViewChangeDone::new(
            ViewNumber::new(1),
            node_name("B"),
            summary_with_size(10),
        )]
    );
}

#[test]
fn vote_after_selection_is_dropped_silently() {
    let (_mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    advance_to_view_1(&mut selector, &mut replicas);
    for sender in ["A", "B", "C"] {
        selector.process_view_change_done(vote(1, "B", 10), node_name(sender), &mut replicas);
    }
    assert!(replicas.all_instances_have_primary());

    // The master already has a primary; the straggler changes nothing.
    assert!(!selector.process_view_change_done(vote(1, "B", 10), node_name("D"), &mut replicas));
}

#[test]
fn view_change_reset_clears_election_state() {
    let (_mock, _ledgers, mut replicas, mut selector) = setup("A", 1);
    advance_to_view_1(&mut selector, &mut replicas);
    for sender in ["A", "B", "C"] {
        selector.process_view_change_done(vote(1, "B", 10), node_name(sender), &mut replicas);
    }
    assert!(selector.accepted_view_change_done().is_some());

    assert!(selector.view_change_started(ViewNumber::new(2), &mut replicas));
    assert_eq!(selector.view_no(), ViewNumber::new(2));
    assert!(selector.accepted_view_change_done().is_none());
    assert!(!replicas.all_instances_have_primary());

    // Non-advancing view numbers are rejected.
    assert!(!selector.view_change_started(ViewNumber::new(2), &mut replicas));
    assert!(!selector.view_change_started(ViewNumber::new(1), &mut replicas));

    // A vote for the now-stale view 1 no longer matches.
    assert!(!selector.process_view_change_done(vote(1, "B", 10), node_name("D"), &mut replicas));
}
