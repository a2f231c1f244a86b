// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

mod common;

use common::engine;

#[test]
fn parking_a_continuation_mirrors_into_every_member_join_set() {
    let engine = engine();
    engine.consume(vec![1, 2, 3], vec![10, 20, 30], 9, false, 0).unwrap();

    for channel in [1, 2, 3] {
        assert_eq!(engine.get_joins(&channel).unwrap(), vec![vec![1, 2, 3]]);
    }
}

#[test]
fn firing_the_last_continuation_clears_every_join_entry() {
    let engine = engine();
    engine.consume(vec![1, 2], vec![10, 20], 9, false, 0).unwrap();
    engine.produce(1, 10, false, 0).unwrap();
    engine.produce(2, 20, false, 0).unwrap();

    assert!(engine.get_joins(&1).unwrap().is_empty());
    assert!(engine.get_joins(&2).unwrap().is_empty());
}

#[test]
fn joins_persist_while_another_continuation_waits_on_the_same_group() {
    let engine = engine();
    engine.consume(vec![1, 2], vec![10, 20], 100, false, 0).unwrap();
    engine.consume(vec![1, 2], vec![10, 20], 200, false, 0).unwrap();

    // Fire exactly one of the two.
    engine.produce(1, 10, false, 0).unwrap();
    engine.produce(2, 20, false, 0).unwrap();
    assert_eq!(engine.get_waiting_continuations(&[1, 2]).unwrap().len(), 1);

    // One continuation still waits under [1, 2]: the joins must survive.
    assert_eq!(engine.get_joins(&1).unwrap(), vec![vec![1, 2]]);
    assert_eq!(engine.get_joins(&2).unwrap(), vec![vec![1, 2]]);

    // Fire the second; now the joins go too.
    engine.produce(1, 10, false, 0).unwrap();
    engine.produce(2, 20, false, 0).unwrap();
    assert!(engine.get_joins(&1).unwrap().is_empty());
    assert!(engine.get_joins(&2).unwrap().is_empty());
}

#[test]
fn one_channel_can_participate_in_many_groups() {
    let engine = engine();
    engine.consume(vec![1], vec![10], 1, false, 0).unwrap();
    engine.consume(vec![1, 2], vec![10, 20], 2, false, 0).unwrap();

    let joins = engine.get_joins(&1).unwrap();
    assert_eq!(joins.len(), 2);
    assert!(joins.contains(&vec![1]));
    assert!(joins.contains(&vec![1, 2]));

    // The pair group cannot fire with no data on channel 2, so the produce
    // must fire the single-channel group and leave the pair in place.
    let (cont, _) = engine.produce(1, 10, false, 0).unwrap().unwrap();
    assert_eq!(cont.channels, vec![1]);
    assert_eq!(engine.get_joins(&1).unwrap(), vec![vec![1, 2]]);
}

#[test]
fn stored_continuations_keep_channel_pattern_arity() {
    let engine = engine();
    engine.consume(vec![1, 2], vec![10, 20], 1, false, 0).unwrap();
    engine.consume(vec![3], vec![30], 2, false, 0).unwrap();

    let pair = engine.get_waiting_continuations(&[1, 2]).unwrap();
    assert_eq!(pair.len(), 1);
    assert_eq!(pair[0].patterns.len(), 2);

    let single = engine.get_waiting_continuations(&[3]).unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].patterns.len(), 1);
}

#[test]
fn group_keys_are_order_sensitive() {
    let engine = engine();
    engine.consume(vec![1, 2], vec![10, 20], 1, false, 0).unwrap();
    engine.consume(vec![2, 1], vec![20, 10], 2, false, 0).unwrap();

    // Two distinct keys, two distinct join entries per channel.
    assert_eq!(engine.get_waiting_continuations(&[1, 2]).unwrap().len(), 1);
    assert_eq!(engine.get_waiting_continuations(&[2, 1]).unwrap().len(), 1);
    assert_eq!(engine.get_joins(&1).unwrap().len(), 2);
    assert_eq!(engine.get_joins(&2).unwrap().len(), 2);
}
