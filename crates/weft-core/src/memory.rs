// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory tuple-space store with content-addressed checkpoints.
//!
//! Three `BTreeMap` tables under one `RwLock`. Write transactions are
//! clone-on-write: the closure mutates a private copy and the commit is a
//! single guarded swap, so an aborting transaction reverts by simply
//! dropping its copy. `BTreeMap` (rather than a hash map) is load-bearing:
//! checkpoint encoding walks the tables in key order, and the canonical
//! byte stream — and therefore the root hash — depends on that order being
//! deterministic.
//!
//! # Canonical snapshot stream
//!
//! - 2-byte little-endian format version.
//! - Branch identifier (8-byte LE length + bytes) — distinct branches never
//!   share roots, even for identical tables.
//! - Each table as an 8-byte LE entry count followed by its entries in
//!   ascending key order; all variable-length fields are 8-byte LE length
//!   prefixed; flags are single bytes; event-reference hashes are raw
//!   32-byte values.
//!
//! Changing any of these rules changes every root and is a breaking change
//! to checkpoint identity.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError, RwLock};

use weft_cas::{MemoryTier, Root, SnapshotTier};

use crate::codec::Codecs;
use crate::event::{Consume, Produce};
use crate::ident::{BranchId, Hash};
use crate::record::{Datum, WaitingContinuation};
use crate::store::{StoreError, StoreReader, StoreWriter, TupleStore};

const SNAPSHOT_VERSION: u16 = 1;

/// The three tuple-space tables.
#[derive(Debug, Clone)]
struct Tables<C, P, A, K> {
    /// Data at rest, per channel, in insertion order.
    data: BTreeMap<C, Vec<Datum<A>>>,
    /// Waiting continuations, keyed by the exact channel sequence.
    conts: BTreeMap<Vec<C>, Vec<WaitingContinuation<P, K>>>,
    /// Reverse index: channel → groups that reference it.
    joins: BTreeMap<C, BTreeSet<Vec<C>>>,
}

impl<C, P, A, K> Default for Tables<C, P, A, K> {
    fn default() -> Self {
        Self {
            data: BTreeMap::new(),
            conts: BTreeMap::new(),
            joins: BTreeMap::new(),
        }
    }
}

/// In-memory [`TupleStore`] implementation with checkpoint history.
///
/// The store is parameterised by a [`BranchId`]: distinct branches are
/// independent checkpoint universes. History lives in a
/// [`weft_cas::MemoryTier`], so every root this store ever produced can be
/// restored with [`TupleStore::reset`].
pub struct MemoryStore<C, P, A, K> {
    branch: BranchId,
    codecs: Codecs<C, P, A, K>,
    tables: RwLock<Tables<C, P, A, K>>,
    history: Mutex<MemoryTier>,
}

impl<C, P, A, K> std::fmt::Debug for MemoryStore<C, P, A, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl<C, P, A, K> MemoryStore<C, P, A, K>
where
    C: Clone + Ord + Send + Sync,
    P: Clone + Send + Sync,
    A: Clone + Send + Sync,
    K: Clone + Send + Sync,
{
    /// Creates an empty store on `branch`.
    pub fn new(branch: BranchId, codecs: Codecs<C, P, A, K>) -> Self {
        Self {
            branch,
            codecs,
            tables: RwLock::new(Tables::default()),
            history: Mutex::new(MemoryTier::new()),
        }
    }

    /// The branch this store namespaces its roots under.
    pub fn branch(&self) -> &BranchId {
        &self.branch
    }
}

// ── transaction wrappers ────────────────────────────────────────────────

struct MemoryReader<'a, C, P, A, K> {
    tables: &'a Tables<C, P, A, K>,
}

struct MemoryWriter<'a, C, P, A, K> {
    tables: &'a mut Tables<C, P, A, K>,
}

fn read_data<C: Ord, P, A: Clone, K>(tables: &Tables<C, P, A, K>, channel: &C) -> Vec<Datum<A>> {
    tables.data.get(channel).cloned().unwrap_or_default()
}

fn read_continuations<C: Ord, P: Clone, A, K: Clone>(
    tables: &Tables<C, P, A, K>,
    channels: &[C],
) -> Vec<WaitingContinuation<P, K>> {
    tables.conts.get(channels).cloned().unwrap_or_default()
}

fn read_joins<C: Clone + Ord, P, A, K>(tables: &Tables<C, P, A, K>, channel: &C) -> Vec<Vec<C>> {
    tables
        .joins
        .get(channel)
        .map_or_else(Vec::new, |groups| groups.iter().cloned().collect())
}

impl<C, P, A, K> StoreReader<C, P, A, K> for MemoryReader<'_, C, P, A, K>
where
    C: Clone + Ord,
    P: Clone,
    A: Clone,
    K: Clone,
{
    fn get_data(&self, channel: &C) -> Result<Vec<Datum<A>>, StoreError> {
        Ok(read_data(self.tables, channel))
    }

    fn get_waiting_continuations(
        &self,
        channels: &[C],
    ) -> Result<Vec<WaitingContinuation<P, K>>, StoreError> {
        Ok(read_continuations(self.tables, channels))
    }

    fn get_joins(&self, channel: &C) -> Result<Vec<Vec<C>>, StoreError> {
        Ok(read_joins(self.tables, channel))
    }
}

impl<C, P, A, K> StoreReader<C, P, A, K> for MemoryWriter<'_, C, P, A, K>
where
    C: Clone + Ord,
    P: Clone,
    A: Clone,
    K: Clone,
{
    fn get_data(&self, channel: &C) -> Result<Vec<Datum<A>>, StoreError> {
        Ok(read_data(self.tables, channel))
    }

    fn get_waiting_continuations(
        &self,
        channels: &[C],
    ) -> Result<Vec<WaitingContinuation<P, K>>, StoreError> {
        Ok(read_continuations(self.tables, channels))
    }

    fn get_joins(&self, channel: &C) -> Result<Vec<Vec<C>>, StoreError> {
        Ok(read_joins(self.tables, channel))
    }
}

impl<C, P, A, K> StoreWriter<C, P, A, K> for MemoryWriter<'_, C, P, A, K>
where
    C: Clone + Ord,
    P: Clone,
    A: Clone,
    K: Clone,
{
    fn put_datum(&mut self, channel: &C, datum: Datum<A>) -> Result<(), StoreError> {
        self.tables
            .data
            .entry(channel.clone())
            .or_default()
            .push(datum);
        Ok(())
    }

    fn remove_datum(&mut self, channel: &C, index: usize) -> Result<(), StoreError> {
        let Some(data) = self.tables.data.get_mut(channel) else {
            return Err(StoreError::IndexOutOfBounds { index, len: 0 });
        };
        if index >= data.len() {
            return Err(StoreError::IndexOutOfBounds {
                index,
                len: data.len(),
            });
        }
        data.remove(index);
        if data.is_empty() {
            self.tables.data.remove(channel);
        }
        Ok(())
    }

    fn put_waiting_continuation(
        &mut self,
        channels: &[C],
        continuation: WaitingContinuation<P, K>,
    ) -> Result<(), StoreError> {
        self.tables
            .conts
            .entry(channels.to_vec())
            .or_default()
            .push(continuation);
        Ok(())
    }

    fn remove_waiting_continuation(
        &mut self,
        channels: &[C],
        index: usize,
    ) -> Result<(), StoreError> {
        let Some(conts) = self.tables.conts.get_mut(channels) else {
            return Err(StoreError::IndexOutOfBounds { index, len: 0 });
        };
        if index >= conts.len() {
            return Err(StoreError::IndexOutOfBounds {
                index,
                len: conts.len(),
            });
        }
        conts.remove(index);
        if conts.is_empty() {
            self.tables.conts.remove(channels);
        }
        Ok(())
    }

    fn add_join(&mut self, channel: &C, channels: &[C]) -> Result<(), StoreError> {
        self.tables
            .joins
            .entry(channel.clone())
            .or_default()
            .insert(channels.to_vec());
        Ok(())
    }

    fn remove_join(&mut self, channel: &C, channels: &[C]) -> Result<(), StoreError> {
        // Joins mirror continuation presence: the entry stays as long as any
        // continuation remains stored under the group key.
        if self.tables.conts.contains_key(channels) {
            return Ok(());
        }
        if let Some(groups) = self.tables.joins.get_mut(channel) {
            groups.remove(channels);
            if groups.is_empty() {
                self.tables.joins.remove(channel);
            }
        }
        Ok(())
    }
}

impl<C, P, A, K> TupleStore<C, P, A, K> for MemoryStore<C, P, A, K>
where
    C: Clone + Ord + Send + Sync,
    P: Clone + Send + Sync,
    A: Clone + Send + Sync,
    K: Clone + Send + Sync,
{
    fn with_read<T>(
        &self,
        f: impl FnOnce(&dyn StoreReader<C, P, A, K>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let reader = MemoryReader { tables: &guard };
        f(&reader)
    }

    fn with_write<T>(
        &self,
        f: impl FnOnce(&mut dyn StoreWriter<C, P, A, K>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut working = guard.clone();
        let mut writer = MemoryWriter {
            tables: &mut working,
        };
        let value = f(&mut writer)?;
        *guard = working;
        Ok(value)
    }

    fn checkpoint(&self) -> Result<Hash, StoreError> {
        let bytes = {
            let guard = self.tables.read().unwrap_or_else(PoisonError::into_inner);
            encode_tables(&self.branch, &self.codecs, &guard)
        };
        let root = {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.put(&bytes)
        };
        Ok(root.0)
    }

    fn reset(&self, root: &Hash) -> Result<(), StoreError> {
        let bytes = {
            let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.get_verified(&Root(*root))?
        };
        let Some(bytes) = bytes else {
            return Err(StoreError::UnknownRoot(*root));
        };
        let tables = decode_tables(&self.branch, &self.codecs, &bytes)?;
        *self.tables.write().unwrap_or_else(PoisonError::into_inner) = tables;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.tables.write().unwrap_or_else(PoisonError::into_inner) = Tables::default();
        Ok(())
    }
}

// ── canonical snapshot encoding ─────────────────────────────────────────

fn push_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_len(out: &mut Vec<u8>, len: usize) {
    push_u64(out, len as u64);
}

fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    push_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

fn push_produce(out: &mut Vec<u8>, source: &Produce) {
    out.extend_from_slice(&source.channel_hash);
    out.extend_from_slice(&source.data_hash);
    out.push(u8::from(source.persist));
    push_u64(out, source.sequence_number);
}

fn push_consume(out: &mut Vec<u8>, source: &Consume) {
    out.extend_from_slice(&source.channels_hash);
    out.extend_from_slice(&source.patterns_hash);
    out.extend_from_slice(&source.continuation_hash);
    out.push(u8::from(source.persist));
    push_u64(out, source.sequence_number);
}

fn encode_tables<C, P, A, K>(
    branch: &BranchId,
    codecs: &Codecs<C, P, A, K>,
    tables: &Tables<C, P, A, K>,
) -> Vec<u8>
where
    C: Ord,
{
    let mut out = Vec::new();
    out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    push_bytes(&mut out, branch.as_bytes());

    push_len(&mut out, tables.data.len());
    for (channel, data) in &tables.data {
        push_bytes(&mut out, &codecs.channel.encode(channel));
        push_len(&mut out, data.len());
        for datum in data {
            push_bytes(&mut out, &codecs.datum.encode(&datum.value));
            out.push(u8::from(datum.persist));
            push_produce(&mut out, &datum.source);
        }
    }

    push_len(&mut out, tables.conts.len());
    for (channels, conts) in &tables.conts {
        push_len(&mut out, channels.len());
        for channel in channels {
            push_bytes(&mut out, &codecs.channel.encode(channel));
        }
        push_len(&mut out, conts.len());
        for continuation in conts {
            push_len(&mut out, continuation.patterns.len());
            for pattern in &continuation.patterns {
                push_bytes(&mut out, &codecs.pattern.encode(pattern));
            }
            push_bytes(
                &mut out,
                &codecs.continuation.encode(&continuation.continuation),
            );
            out.push(u8::from(continuation.persist));
            push_consume(&mut out, &continuation.source);
        }
    }

    push_len(&mut out, tables.joins.len());
    for (channel, groups) in &tables.joins {
        push_bytes(&mut out, &codecs.channel.encode(channel));
        push_len(&mut out, groups.len());
        for group in groups {
            push_len(&mut out, group.len());
            for channel in group {
                push_bytes(&mut out, &codecs.channel.encode(channel));
            }
        }
    }

    out
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or(StoreError::Corrupt("length overflow"))?;
        if end > self.bytes.len() {
            return Err(StoreError::Corrupt("truncated snapshot"));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, StoreError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u64(&mut self) -> Result<u64, StoreError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    fn len(&mut self) -> Result<usize, StoreError> {
        usize::try_from(self.u64()?).map_err(|_| StoreError::Corrupt("length overflow"))
    }

    fn flag(&mut self) -> Result<bool, StoreError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(StoreError::Corrupt("invalid flag byte")),
        }
    }

    fn hash(&mut self) -> Result<Hash, StoreError> {
        let bytes = self.take(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(bytes);
        Ok(hash)
    }

    fn bytes_field(&mut self) -> Result<&'a [u8], StoreError> {
        let len = self.len()?;
        self.take(len)
    }

    fn finish(&self) -> Result<(), StoreError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(StoreError::Corrupt("trailing bytes after snapshot"))
        }
    }
}

fn parse_produce(cursor: &mut Cursor<'_>) -> Result<Produce, StoreError> {
    Ok(Produce {
        channel_hash: cursor.hash()?,
        data_hash: cursor.hash()?,
        persist: cursor.flag()?,
        sequence_number: cursor.u64()?,
    })
}

fn parse_consume(cursor: &mut Cursor<'_>) -> Result<Consume, StoreError> {
    Ok(Consume {
        channels_hash: cursor.hash()?,
        patterns_hash: cursor.hash()?,
        continuation_hash: cursor.hash()?,
        persist: cursor.flag()?,
        sequence_number: cursor.u64()?,
    })
}

fn decode_tables<C, P, A, K>(
    branch: &BranchId,
    codecs: &Codecs<C, P, A, K>,
    bytes: &[u8],
) -> Result<Tables<C, P, A, K>, StoreError>
where
    C: Clone + Ord,
{
    let mut cursor = Cursor::new(bytes);
    if cursor.u16()? != SNAPSHOT_VERSION {
        return Err(StoreError::Corrupt("unsupported snapshot version"));
    }
    if cursor.bytes_field()? != branch.as_bytes() {
        return Err(StoreError::Corrupt("snapshot belongs to another branch"));
    }

    let mut tables = Tables::default();

    let data_entries = cursor.len()?;
    for _ in 0..data_entries {
        let channel = codecs.channel.decode(cursor.bytes_field()?)?;
        let count = cursor.len()?;
        let mut data = Vec::with_capacity(count);
        for _ in 0..count {
            let value = codecs.datum.decode(cursor.bytes_field()?)?;
            let persist = cursor.flag()?;
            let source = parse_produce(&mut cursor)?;
            data.push(Datum {
                value,
                persist,
                source,
            });
        }
        tables.data.insert(channel, data);
    }

    let cont_entries = cursor.len()?;
    for _ in 0..cont_entries {
        let arity = cursor.len()?;
        let mut channels = Vec::with_capacity(arity);
        for _ in 0..arity {
            channels.push(codecs.channel.decode(cursor.bytes_field()?)?);
        }
        let count = cursor.len()?;
        let mut conts = Vec::with_capacity(count);
        for _ in 0..count {
            let pattern_count = cursor.len()?;
            let mut patterns = Vec::with_capacity(pattern_count);
            for _ in 0..pattern_count {
                patterns.push(codecs.pattern.decode(cursor.bytes_field()?)?);
            }
            let continuation = codecs.continuation.decode(cursor.bytes_field()?)?;
            let persist = cursor.flag()?;
            let source = parse_consume(&mut cursor)?;
            conts.push(WaitingContinuation {
                patterns,
                continuation,
                persist,
                source,
            });
        }
        tables.conts.insert(channels, conts);
    }

    let join_entries = cursor.len()?;
    for _ in 0..join_entries {
        let channel = codecs.channel.decode(cursor.bytes_field()?)?;
        let group_count = cursor.len()?;
        let mut groups = BTreeSet::new();
        for _ in 0..group_count {
            let arity = cursor.len()?;
            let mut group = Vec::with_capacity(arity);
            for _ in 0..arity {
                group.push(codecs.channel.decode(cursor.bytes_field()?)?);
            }
            groups.insert(group);
        }
        tables.joins.insert(channel, groups);
    }

    cursor.finish()?;
    Ok(tables)
}
