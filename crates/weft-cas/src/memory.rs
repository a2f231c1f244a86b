// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory content-addressed snapshot tier.
//!
//! [`MemoryTier`] is the snapshot-history implementation the in-memory
//! tuple-space store ships with: every checkpoint root ever produced stays
//! resident so `reset` can restore it. History compaction is a non-goal.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{snapshot_root, Root, SnapshotTier};

/// In-memory content-addressed snapshot store.
///
/// Stores snapshots in a `HashMap<Root, Arc<[u8]>>`. Deduplication is
/// structural: re-checkpointing an unchanged state stores nothing new.
#[derive(Debug, Default)]
pub struct MemoryTier {
    snapshots: HashMap<Root, Arc<[u8]>>,
    byte_count: usize,
}

impl MemoryTier {
    /// Create an empty tier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct snapshots currently stored.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns `true` if no snapshots are stored.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Total bytes stored across all snapshots.
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }
}

impl SnapshotTier for MemoryTier {
    fn put(&mut self, bytes: &[u8]) -> Root {
        let root = snapshot_root(bytes);
        if self.snapshots.contains_key(&root) {
            return root;
        }
        self.byte_count += bytes.len();
        self.snapshots.insert(root, Arc::from(bytes));
        root
    }

    fn get(&self, root: &Root) -> Option<Arc<[u8]>> {
        self.snapshots.get(root).cloned()
    }

    fn has(&self, root: &Root) -> bool {
        self.snapshots.contains_key(root)
    }
}
