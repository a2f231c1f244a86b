// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Append-only trace log with prepend + take-and-clear semantics.
//!
//! The log is an immutable cons list behind a shared head pointer. Prepend
//! swaps the head for a new cell pointing at the old head; take swaps the
//! head with the empty list and walks the drained cells. Both operations
//! touch the lock only for the single pointer exchange — traversal happens
//! on the caller's own (now-private) list, so a slow drain never blocks
//! producers.

use std::sync::{Arc, Mutex, PoisonError};

use crate::event::Event;

#[derive(Debug)]
struct Cell {
    event: Event,
    next: Option<Arc<Cell>>,
}

/// Append-only trace log accumulating events since the last checkpoint.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    head: Mutex<Option<Arc<Cell>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Prepends an event in O(1).
    pub(crate) fn prepend(&self, event: Event) {
        let mut head = self.head.lock().unwrap_or_else(PoisonError::into_inner);
        let next = head.take();
        *head = Some(Arc::new(Cell { event, next }));
    }

    /// Atomically drains the log, returning events in prepend order (most
    /// recent first).
    pub(crate) fn take(&self) -> Vec<Event> {
        let drained = {
            let mut head = self.head.lock().unwrap_or_else(PoisonError::into_inner);
            head.take()
        };
        Self::collect(drained)
    }

    /// Returns the current events in prepend order without clearing.
    pub(crate) fn snapshot(&self) -> Vec<Event> {
        let head = {
            let guard = self.head.lock().unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        };
        Self::collect(head)
    }

    fn collect(head: Option<Arc<Cell>>) -> Vec<Event> {
        let mut events = Vec::new();
        let mut cursor = head;
        while let Some(cell) = cursor {
            events.push(cell.event.clone());
            cursor = cell.next.clone();
        }
        events
    }
}
