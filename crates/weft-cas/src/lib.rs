// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Content-addressed snapshot tier for the weft tuple-space store.
//!
//! `weft-cas` provides a [`SnapshotTier`] trait for content-addressed storage
//! of canonical state snapshots keyed by BLAKE3 hash, plus the in-memory
//! [`MemoryTier`] the shipped store uses for checkpoint history. Disk tiers
//! and history compaction are deliberately out of scope here; the store only
//! relies on put/get/has semantics.
//!
//! # Hash Domain Policy
//!
//! The snapshot hash is content-only: `BLAKE3(bytes)` with no domain prefix.
//! Two snapshots with identical canonical bytes are the same snapshot — that
//! is exactly the checkpoint-idempotence property the engine exposes (an idle
//! engine checkpoints to the same root twice). Domain separation happens in
//! the canonical encoding above this layer, which embeds the branch
//! identifier; distinct branches therefore never collide even on identical
//! table contents.
//!
//! # Determinism Invariant
//!
//! No public API exposes tier iteration order. Determinism is content-level:
//! same bytes, same root.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod memory;
pub use memory::MemoryTier;

use std::sync::Arc;

/// A 32-byte BLAKE3 content hash identifying one canonical snapshot.
///
/// Thin newtype over `[u8; 32]`. The inner bytes are public for zero-cost
/// access; the `Display` impl renders lowercase hex for logs and errors.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Root(pub [u8; 32]);

impl Root {
    /// View the root as a byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Compute the BLAKE3 content hash of a canonical snapshot.
///
/// No domain prefix — the content IS the identity. See module-level docs for
/// the hash domain policy.
pub fn snapshot_root(bytes: &[u8]) -> Root {
    let hash = blake3::hash(bytes);
    Root(*hash.as_bytes())
}

/// Errors that can occur during tier operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CasError {
    /// Stored bytes no longer match their declared root.
    #[error("snapshot integrity failure: expected {expected}, computed {computed}")]
    Integrity {
        /// The root the bytes were stored under.
        expected: Root,
        /// The root actually computed from the stored bytes.
        computed: Root,
    },
}

/// Content-addressed snapshot storage.
///
/// Implementations store opaque canonical byte streams keyed by their BLAKE3
/// hash. The trait is synchronous and object-safe; the tuple-space store
/// holds it behind its own synchronisation.
///
/// # Absence Semantics
///
/// [`get`](SnapshotTier::get) returns `None` for missing roots — this is
/// **not** an error. A missing root means the caller asked for a checkpoint
/// this tier never saw (wrong branch, different process). Error variants are
/// reserved for integrity violations.
pub trait SnapshotTier {
    /// Compute the root and store the snapshot. Returns the content root.
    ///
    /// Putting bytes that are already present is a no-op returning the same
    /// root — checkpointing an unchanged state is idempotent by construction.
    fn put(&mut self, bytes: &[u8]) -> Root;

    /// Retrieve a snapshot by root. Returns `None` if not stored.
    fn get(&self, root: &Root) -> Option<Arc<[u8]>>;

    /// Retrieve a snapshot and re-verify its content hash.
    ///
    /// The restore path runs through this rather than [`get`](SnapshotTier::get):
    /// a tier that hands back corrupted bytes must be caught before the store
    /// decodes them into live tables.
    ///
    /// # Errors
    ///
    /// Returns [`CasError::Integrity`] when the stored bytes hash to a
    /// different root than the one they are filed under.
    fn get_verified(&self, root: &Root) -> Result<Option<Arc<[u8]>>, CasError> {
        match self.get(root) {
            None => Ok(None),
            Some(bytes) => {
                let computed = snapshot_root(&bytes);
                if computed == *root {
                    Ok(Some(bytes))
                } else {
                    Err(CasError::Integrity {
                        expected: *root,
                        computed,
                    })
                }
            }
        }
    }

    /// Check existence without retrieving.
    fn has(&self, root: &Root) -> bool;
}
