// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

mod common;

use common::{engine, engine_on};
use weft_core::{BranchId, EngineError, StoreError};

#[test]
fn reset_restores_a_consumed_datum() {
    let engine = engine();

    engine.produce(1, 10, false, 0).unwrap();
    let checkpoint = engine.create_checkpoint().unwrap();

    // Consume the datum, then rewind.
    assert!(engine.consume(vec![1], vec![10], 1, false, 0).unwrap().is_some());
    assert!(engine.get_data(&1).unwrap().is_empty());

    engine.reset(&checkpoint.root).unwrap();
    let data = engine.get_data(&1).unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].value, 10);

    // The restored datum is live: it can be consumed again.
    assert!(engine.consume(vec![1], vec![10], 2, false, 0).unwrap().is_some());
}

#[test]
fn reset_restores_parked_continuations_and_joins() {
    let engine = engine();

    engine.consume(vec![1, 2], vec![10, 20], 9, false, 0).unwrap();
    let checkpoint = engine.create_checkpoint().unwrap();

    engine.produce(1, 10, false, 0).unwrap();
    engine.produce(2, 20, false, 0).unwrap();
    assert!(engine.get_waiting_continuations(&[1, 2]).unwrap().is_empty());

    engine.reset(&checkpoint.root).unwrap();
    assert_eq!(engine.get_waiting_continuations(&[1, 2]).unwrap().len(), 1);
    assert_eq!(engine.get_joins(&1).unwrap(), vec![vec![1, 2]]);
    assert_eq!(engine.get_joins(&2).unwrap(), vec![vec![1, 2]]);
}

#[test]
fn reset_clears_the_trace() {
    let engine = engine();
    let checkpoint = engine.create_checkpoint().unwrap();

    engine.produce(1, 10, false, 0).unwrap();
    assert!(!engine.trace_events().is_empty());

    engine.reset(&checkpoint.root).unwrap();
    assert!(engine.trace_events().is_empty());
}

#[test]
fn reset_to_a_foreign_root_fails() {
    let engine = engine();
    let err = engine.reset(&[0xCD; 32]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::UnknownRoot(_))
    ));
}

#[test]
fn clear_drops_tables_and_trace() {
    let engine = engine();
    engine.produce(1, 10, false, 0).unwrap();
    engine.consume(vec![2], vec![20], 1, false, 0).unwrap();

    engine.clear().unwrap();
    assert!(engine.get_data(&1).unwrap().is_empty());
    assert!(engine.get_waiting_continuations(&[2]).unwrap().is_empty());
    assert!(engine.trace_events().is_empty());
}

#[test]
fn same_state_same_root_across_histories() {
    // Two different paths to the same table contents converge on one root.
    let first = engine();
    first.produce(1, 10, false, 0).unwrap();

    let second = engine();
    second.produce(1, 11, false, 0).unwrap();
    second.consume(vec![1], vec![11], 1, false, 0).unwrap();
    second.produce(1, 10, false, 0).unwrap();

    assert_eq!(
        first.create_checkpoint().unwrap().root,
        second.create_checkpoint().unwrap().root
    );
}

#[test]
fn distinct_branches_never_share_roots() {
    let main = engine_on(BranchId::default(), 42);
    let side = engine_on(BranchId::new(&b"side"[..]), 42);

    main.produce(1, 10, false, 0).unwrap();
    side.produce(1, 10, false, 0).unwrap();

    assert_ne!(
        main.create_checkpoint().unwrap().root,
        side.create_checkpoint().unwrap().root
    );
}

#[test]
fn empty_engines_on_one_branch_share_the_empty_root() {
    let first = engine_on(BranchId::default(), 1);
    let second = engine_on(BranchId::default(), 2);
    assert_eq!(
        first.create_checkpoint().unwrap().root,
        second.create_checkpoint().unwrap().root
    );
}
