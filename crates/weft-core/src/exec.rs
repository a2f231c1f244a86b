// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scoped worker pool for offloading engine calls.
//!
//! The engine itself is synchronous; hosts decide where its CPU-bound
//! matching work runs. This module is the batteries-included answer: a
//! work-queue executor over scoped threads with an atomic claim counter
//! (work-stealing), so a batch of produces and consumes saturates the
//! machine without any task runtime.
//!
//! Execution order across workers is non-deterministic; the engine's lock
//! manager is what guarantees that only non-colliding calls overlap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Runs every task on a pool of `workers` scoped threads and returns the
/// results in task order.
///
/// Workers dynamically claim tasks via an atomic counter, so uneven task
/// costs balance themselves.
///
/// # Panics
///
/// Panics if `workers == 0` or if any task panics (the panic is resumed on
/// the calling thread).
pub fn run_work_queue<T, F>(tasks: Vec<F>, workers: usize) -> Vec<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    assert!(workers >= 1, "need at least one worker");
    if tasks.is_empty() {
        return Vec::new();
    }

    let slots: Vec<Mutex<Option<F>>> = tasks.into_iter().map(|t| Mutex::new(Some(t))).collect();
    let next_task = AtomicUsize::new(0);

    let mut gathered: Vec<(usize, T)> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let slots = &slots;
                let next_task = &next_task;

                s.spawn(move || {
                    let mut results = Vec::new();
                    // Work-stealing loop: claim task indices until none remain.
                    loop {
                        let index = next_task.fetch_add(1, Ordering::Relaxed);
                        if index >= slots.len() {
                            break;
                        }
                        let task = slots[index]
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .take();
                        if let Some(task) = task {
                            results.push((index, task()));
                        }
                    }
                    results
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect()
    });

    gathered.sort_by_key(|(index, _)| *index);
    gathered.into_iter().map(|(_, result)| result).collect()
}
