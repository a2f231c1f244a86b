// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transactional multimap store interface.
//!
//! The engine relies on exactly two properties of its store: reads within a
//! transaction observe a consistent snapshot, and writes are atomic at
//! commit. Everything else — backing structure, durability, caching — is the
//! implementation's business. Transactions are scoped closures rather than
//! handle objects: release and abort are structural (leaving the closure),
//! so no exit path can leak a transaction.

use thiserror::Error;

use crate::codec::CodecError;
use crate::ident::Hash;
use crate::record::{Datum, WaitingContinuation};

/// Store-level failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A removal targeted an index past the end of its sequence.
    #[error("removal index {index} out of bounds for sequence of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The sequence length at the time of the call.
        len: usize,
    },
    /// A reset targeted a root this store has never checkpointed.
    #[error("unknown checkpoint root")]
    UnknownRoot(Hash),
    /// A stored snapshot failed structural validation during restore.
    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),
    /// The snapshot tier reported an integrity failure.
    #[error(transparent)]
    Cas(#[from] weft_cas::CasError),
    /// A codec rejected bytes during snapshot restore.
    #[error("codec failure during snapshot restore: {0}")]
    Codec(#[from] CodecError),
    /// Backend-specific failure (I/O, environment) from other
    /// implementations of [`TupleStore`].
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Read operations available inside any transaction.
///
/// Missing keys read as empty sequences — absence is not an error anywhere
/// in the store.
pub trait StoreReader<C, P, A, K> {
    /// Returns the data at rest on `channel`, in insertion order.
    ///
    /// # Errors
    /// Propagates backend failures; an in-memory store never fails here.
    fn get_data(&self, channel: &C) -> Result<Vec<Datum<A>>, StoreError>;

    /// Returns the continuations waiting on exactly this channel sequence
    /// (order-sensitive key), in insertion order.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn get_waiting_continuations(
        &self,
        channels: &[C],
    ) -> Result<Vec<WaitingContinuation<P, K>>, StoreError>;

    /// Returns the channel groups `channel` participates in.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn get_joins(&self, channel: &C) -> Result<Vec<Vec<C>>, StoreError>;
}

/// Write operations available inside a write transaction.
///
/// Reads through a writer observe the transaction's own uncommitted
/// mutations.
pub trait StoreWriter<C, P, A, K>: StoreReader<C, P, A, K> {
    /// Appends a datum to `channel`'s data sequence.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn put_datum(&mut self, channel: &C, datum: Datum<A>) -> Result<(), StoreError>;

    /// Removes the datum at `index`, shifting successors down.
    ///
    /// # Errors
    /// Returns [`StoreError::IndexOutOfBounds`] when `index` is past the end
    /// of the sequence.
    fn remove_datum(&mut self, channel: &C, index: usize) -> Result<(), StoreError>;

    /// Appends a waiting continuation under the exact channel sequence.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn put_waiting_continuation(
        &mut self,
        channels: &[C],
        continuation: WaitingContinuation<P, K>,
    ) -> Result<(), StoreError>;

    /// Removes the waiting continuation at `index`, shifting successors.
    ///
    /// # Errors
    /// Returns [`StoreError::IndexOutOfBounds`] when `index` is past the end
    /// of the sequence.
    fn remove_waiting_continuation(&mut self, channels: &[C], index: usize)
        -> Result<(), StoreError>;

    /// Records that `channel` participates in the group `channels`.
    ///
    /// Idempotent: the join index is a set per channel.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn add_join(&mut self, channel: &C, channels: &[C]) -> Result<(), StoreError>;

    /// Removes `channels` from `channel`'s join set — but only once no
    /// waiting continuation remains stored under that group key.
    ///
    /// The guard is what keeps the join index exactly mirroring continuation
    /// presence: a persistent continuation keeps its joins alive through any
    /// number of matches.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn remove_join(&mut self, channel: &C, channels: &[C]) -> Result<(), StoreError>;
}

/// Transactional multimap over the three tuple-space tables, with a
/// content-addressed checkpoint surface.
pub trait TupleStore<C, P, A, K>: Send + Sync {
    /// Runs `f` inside a read transaction observing a consistent snapshot.
    ///
    /// # Errors
    /// Propagates the closure's error or a backend failure opening the
    /// transaction.
    fn with_read<T>(
        &self,
        f: impl FnOnce(&dyn StoreReader<C, P, A, K>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError>;

    /// Runs `f` inside a write transaction.
    ///
    /// The transaction commits atomically iff `f` returns `Ok`; an `Err`
    /// aborts and reverts every buffered mutation.
    ///
    /// # Errors
    /// Propagates the closure's error (after aborting) or a backend failure.
    fn with_write<T>(
        &self,
        f: impl FnOnce(&mut dyn StoreWriter<C, P, A, K>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError>;

    /// Flushes the current state into the content-addressed snapshot tier
    /// and returns its root.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn checkpoint(&self) -> Result<Hash, StoreError>;

    /// Restores the state recorded under a previous checkpoint root.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownRoot`] when this store (branch) never
    /// produced `root`; [`StoreError::Corrupt`] or [`StoreError::Codec`]
    /// when the stored snapshot fails to decode.
    fn reset(&self, root: &Hash) -> Result<(), StoreError>;

    /// Drops all three tables back to empty.
    ///
    /// # Errors
    /// Propagates backend failures.
    fn clear(&self) -> Result<(), StoreError>;
}
