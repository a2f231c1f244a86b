// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

mod common;

use common::engine;
use weft_core::exec::run_work_queue;
use weft_core::Event;

type Task<'a> = Box<dyn FnOnce() -> u32 + Send + 'a>;

#[test]
fn racing_produces_and_consumes_conserve_every_datum() {
    let engine = engine();

    let mut tasks: Vec<Task<'_>> = Vec::new();
    for i in 0..64 {
        let engine = &engine;
        if i % 2 == 0 {
            tasks.push(Box::new(move || {
                u32::from(engine.produce(1, 10, false, 0).unwrap().is_some())
            }));
        } else {
            tasks.push(Box::new(move || {
                u32::from(engine.consume(vec![1], vec![10], i, false, 0).unwrap().is_some())
            }));
        }
    }

    let rendezvous: u32 = run_work_queue(tasks, 8).into_iter().sum();

    // Each rendezvous consumed exactly one datum and one continuation; the
    // leftovers on each side account for everything else.
    let remaining_data = u32::try_from(engine.get_data(&1).unwrap().len()).unwrap();
    let remaining_conts =
        u32::try_from(engine.get_waiting_continuations(&[1]).unwrap().len()).unwrap();
    assert_eq!(remaining_data, 32 - rendezvous);
    assert_eq!(remaining_conts, 32 - rendezvous);
}

#[test]
fn two_channel_groups_conserve_across_racing_produces() {
    let engine = engine();

    let mut tasks: Vec<Task<'_>> = Vec::new();
    for i in 0..10 {
        let engine = &engine;
        tasks.push(Box::new(move || {
            u32::from(
                engine
                    .consume(vec![1, 2], vec![10, 20], i, false, 0)
                    .unwrap()
                    .is_some(),
            )
        }));
        tasks.push(Box::new(move || {
            u32::from(engine.produce(1, 10, false, 0).unwrap().is_some())
        }));
        tasks.push(Box::new(move || {
            u32::from(engine.produce(2, 20, false, 0).unwrap().is_some())
        }));
    }

    let rendezvous: u32 = run_work_queue(tasks, 8).into_iter().sum();

    let data_1 = u32::try_from(engine.get_data(&1).unwrap().len()).unwrap();
    let data_2 = u32::try_from(engine.get_data(&2).unwrap().len()).unwrap();
    let conts = u32::try_from(engine.get_waiting_continuations(&[1, 2]).unwrap().len()).unwrap();

    // Every rendezvous took one datum from each channel and one
    // continuation.
    assert_eq!(data_1, 10 - rendezvous);
    assert_eq!(data_2, 10 - rendezvous);
    assert_eq!(conts, 10 - rendezvous);
}

#[test]
fn disjoint_channel_pairs_all_rendezvous() {
    let engine = engine();

    let mut tasks: Vec<Task<'_>> = Vec::new();
    for channel in 0..8 {
        let engine = &engine;
        tasks.push(Box::new(move || {
            u32::from(engine.produce(channel, 10, false, 0).unwrap().is_some())
        }));
        tasks.push(Box::new(move || {
            u32::from(
                engine
                    .consume(vec![channel], vec![10], channel, false, 0)
                    .unwrap()
                    .is_some(),
            )
        }));
    }

    // Whichever side arrives second completes the pair, so every pair
    // yields exactly one rendezvous.
    let rendezvous: u32 = run_work_queue(tasks, 8).into_iter().sum();
    assert_eq!(rendezvous, 8);

    for channel in 0..8 {
        assert!(engine.get_data(&channel).unwrap().is_empty());
        assert!(engine.get_waiting_continuations(&[channel]).unwrap().is_empty());
    }
}

#[test]
fn trace_stays_faithful_under_contention() {
    let engine = engine();

    let mut tasks: Vec<Task<'_>> = Vec::new();
    for i in 0..20 {
        let engine = &engine;
        tasks.push(Box::new(move || {
            u32::from(engine.produce(i % 3, 10, false, 0).unwrap().is_some())
        }));
        tasks.push(Box::new(move || {
            u32::from(
                engine
                    .consume(vec![i % 3], vec![10], i, false, 0)
                    .unwrap()
                    .is_some(),
            )
        }));
    }
    run_work_queue(tasks, 8);

    let checkpoint = engine.create_checkpoint().unwrap();
    let events: Vec<&Event> = checkpoint.log_in_program_order().collect();

    // Every COMM references a consume and produces that appear earlier in
    // the trace, and pairs exactly as many produces as the consume's arity.
    for (position, event) in events.iter().enumerate() {
        if let Event::Comm(comm) = event {
            let earlier = &events[..position];
            assert!(earlier
                .iter()
                .any(|e| matches!(e, Event::Consume(c) if *c == comm.consume)));
            for produce in &comm.produces {
                assert!(earlier
                    .iter()
                    .any(|e| matches!(e, Event::Produce(p) if p == produce)));
            }
            assert_eq!(comm.produces.len(), 1);
        }
    }
}
