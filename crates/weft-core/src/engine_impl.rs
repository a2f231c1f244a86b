// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core tuple-space engine implementation.
//!
//! The engine mediates rendezvous between produced data and consuming
//! continuations over a transactional store. Each entry point runs a
//! critical section under the striped lock manager: snapshot the relevant
//! tables, speculatively match against shuffled shadows, then either commit
//! the rendezvous (removals + COMM trace event) or park the unmatched side.
//!
//! # Trace discipline
//!
//! The initiating produce/consume reference is appended to the trace log as
//! soon as the critical section is entered — before matching. A COMM event
//! is appended only when a rendezvous commits. The trace therefore records
//! every attempt, and a matcher error leaves the initiating event behind
//! with no COMM. This is intentional.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, error};

use crate::checkpoint::Checkpoint;
use crate::codec::Codecs;
use crate::event::{Comm, Event};
use crate::event_log::EventLog;
use crate::extract::{
    extract_data_candidates, extract_produce_candidate, GroupSnapshot, ShadowData,
};
use crate::ident::Hash;
use crate::locks::LockManager;
use crate::matcher::Match;
use crate::prng::Prng;
use crate::record::{
    ContResult, DataCandidate, Datum, MatchedDatum, ProduceCandidate, WaitingContinuation,
};
use crate::store::{StoreError, TupleStore};
use crate::telemetry::{NullTelemetrySink, TelemetrySink};

/// Successful rendezvous payload: the fired continuation plus its matched
/// data, in pattern order.
pub type Rendezvous<C, P, A, K, R> = (ContResult<C, P, K>, Vec<MatchedDatum<A, R>>);

/// Errors emitted by the engine.
///
/// Argument validation failures are reported here — through the effect
/// channel — rather than through the matcher's error type: a malformed call
/// is the caller's bug, not a property of the pattern language.
#[derive(Debug, Error)]
pub enum EngineError<E>
where
    E: std::error::Error + 'static,
{
    /// Empty channel sequence, or channel/pattern arity mismatch.
    #[error("channels and patterns must be non-empty and of equal arity (got {channels} channels, {patterns} patterns)")]
    InvalidArgument {
        /// Number of channels supplied.
        channels: usize,
        /// Number of patterns supplied.
        patterns: usize,
    },
    /// The matcher failed during extraction. Nothing was committed on this
    /// path beyond the initiating trace event.
    #[error("matcher failed during extraction")]
    Match(#[source] E),
    /// The store failed. Bubbled up without retry.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Returns the default shuffle seed.
///
/// Precedence:
/// 1. `WEFT_SHUFFLE_SEED` environment variable (if set and valid) — pin it
///    in CI to replay a run's match order exactly.
/// 2. The system clock, so unpinned runs do not share positional bias.
fn default_shuffle_seed() -> u64 {
    if let Ok(val) = std::env::var("WEFT_SHUFFLE_SEED") {
        if let Ok(seed) = val.parse::<u64>() {
            return seed;
        }
    }
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(elapsed) => u64::from(elapsed.subsec_nanos()) ^ elapsed.as_secs().rotate_left(32),
        Err(_) => 0x9e37_79b9_7f4a_7c15,
    }
}

/// Fluent builder for constructing [`Engine`] instances.
///
/// Store, matcher, and codec table are required up front; the shuffle seed
/// and telemetry sink are optional.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use weft_core::{BranchId, Codec, CodecError, Codecs, EngineBuilder, Match, MemoryStore};
///
/// struct I32Codec;
/// impl Codec<i32> for I32Codec {
///     fn encode(&self, value: &i32) -> bytes::Bytes {
///         bytes::Bytes::copy_from_slice(&value.to_le_bytes())
///     }
///     fn decode(&self, bytes: &[u8]) -> Result<i32, CodecError> {
///         let arr: [u8; 4] = bytes.try_into().map_err(|_| CodecError::LengthMismatch {
///             expected: 4,
///             found: bytes.len(),
///         })?;
///         Ok(i32::from_le_bytes(arr))
///     }
/// }
///
/// struct Equality;
/// impl Match<i32, i32> for Equality {
///     type Output = i32;
///     type Error = std::convert::Infallible;
///     fn check(&self, pattern: &i32, data: &i32) -> Result<Option<i32>, Self::Error> {
///         Ok((pattern == data).then_some(*data))
///     }
/// }
///
/// let codec = Arc::new(I32Codec);
/// let codecs = Codecs::new(codec.clone(), codec.clone(), codec.clone(), codec);
/// let store = MemoryStore::new(BranchId::default(), codecs.clone());
/// let engine = EngineBuilder::new(store, Equality, codecs)
///     .shuffle_seed(42)
///     .build();
/// # let _ = engine;
/// ```
pub struct EngineBuilder<C, P, A, K, M, S> {
    store: S,
    matcher: M,
    codecs: Codecs<C, P, A, K>,
    shuffle_seed: u64,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl<C, P, A, K, M, S> EngineBuilder<C, P, A, K, M, S>
where
    C: Clone + Ord + Send + Sync,
    P: Clone + Send + Sync,
    A: Clone + Send + Sync,
    K: Clone + Send + Sync,
    M: Match<P, A> + Send + Sync,
    S: TupleStore<C, P, A, K>,
{
    /// Creates a builder with the default shuffle seed (env override or
    /// clock) and a null telemetry sink.
    pub fn new(store: S, matcher: M, codecs: Codecs<C, P, A, K>) -> Self {
        Self {
            store,
            matcher,
            codecs,
            shuffle_seed: default_shuffle_seed(),
            telemetry: None,
        }
    }

    /// Pins the fairness-shuffle seed so match order replays exactly.
    #[must_use]
    pub fn shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = seed;
        self
    }

    /// Sets the telemetry sink for comm counters and checkpoint events.
    #[must_use]
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> Engine<C, P, A, K, M, S> {
        Engine {
            store: self.store,
            matcher: self.matcher,
            codecs: self.codecs,
            locks: LockManager::new(),
            log: EventLog::new(),
            prng: Mutex::new(Prng::from_seed_u64(self.shuffle_seed)),
            telemetry: self
                .telemetry
                .unwrap_or_else(|| Arc::new(NullTelemetrySink)),
        }
    }
}

/// Tuple-space matching engine over a transactional store.
///
/// The engine is `Send + Sync`; hosts call [`Engine::consume`] and
/// [`Engine::produce`] from any number of threads (typically offloaded onto
/// a worker pool — see [`crate::exec`]) and the striped lock manager
/// serializes exactly the calls whose channel sets can collide.
pub struct Engine<C, P, A, K, M, S> {
    store: S,
    matcher: M,
    codecs: Codecs<C, P, A, K>,
    locks: LockManager,
    log: EventLog,
    prng: Mutex<Prng>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<C, P, A, K, M, S> std::fmt::Debug for Engine<C, P, A, K, M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl<C, P, A, K, M, S> Engine<C, P, A, K, M, S>
where
    C: Clone + Ord + Send + Sync,
    P: Clone + Send + Sync,
    A: Clone + Send + Sync,
    K: Clone + Send + Sync,
    M: Match<P, A> + Send + Sync,
    S: TupleStore<C, P, A, K>,
{
    /// Registers interest in data on a tuple of channels.
    ///
    /// If every pattern can be satisfied by data currently at rest, the
    /// matched data is atomically removed (persistent data excepted) and
    /// returned with the continuation; otherwise the continuation is parked
    /// until matching produces arrive, and `Ok(None)` is returned.
    ///
    /// `patterns` corresponds positionally to `channels`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidArgument`] when `channels` is empty or the
    ///   arities differ; nothing is logged or stored.
    /// - [`EngineError::Match`] when the matcher fails; the initiating
    ///   consume event remains in the trace, the store is untouched.
    /// - [`EngineError::Store`] on store failure.
    pub fn consume(
        &self,
        channels: Vec<C>,
        patterns: Vec<P>,
        continuation: K,
        persist: bool,
        sequence_number: u64,
    ) -> Result<Option<Rendezvous<C, P, A, K, M::Output>>, EngineError<M::Error>> {
        if channels.is_empty() || channels.len() != patterns.len() {
            return Err(EngineError::InvalidArgument {
                channels: channels.len(),
                patterns: patterns.len(),
            });
        }

        let consume_ref =
            self.codecs
                .consume_ref(&channels, &patterns, &continuation, persist, sequence_number);
        let channel_hashes: Vec<Hash> = channels
            .iter()
            .map(|c| self.codecs.channel_hash(c))
            .collect();
        let _guard = self.locks.lock_channels(&channel_hashes);

        self.log.prepend(Event::Consume(consume_ref.clone()));

        let unique: BTreeSet<&C> = channels.iter().collect();
        let raw = self.store.with_read(|reader| {
            let mut rows = Vec::with_capacity(unique.len());
            for channel in unique.iter().copied() {
                rows.push((channel.clone(), reader.get_data(channel)?));
            }
            Ok(rows)
        })?;

        let mut shadow: ShadowData<C, A> = BTreeMap::new();
        {
            let mut prng = self.prng.lock().unwrap_or_else(PoisonError::into_inner);
            for (channel, data) in raw {
                let mut indexed: Vec<(Datum<A>, Option<usize>)> = data
                    .into_iter()
                    .enumerate()
                    .map(|(index, datum)| (datum, Some(index)))
                    .collect();
                prng.shuffle(&mut indexed);
                shadow.insert(channel, indexed);
            }
        }

        let pairs: Vec<(C, P)> = channels
            .iter()
            .cloned()
            .zip(patterns.iter().cloned())
            .collect();
        let extracted =
            extract_data_candidates(&self.matcher, &pairs, &mut shadow).map_err(|e| {
                error!(target: "weft::engine", error = %e, "matcher failed during consume");
                EngineError::Match(e)
            })?;

        match extracted {
            None => {
                self.store.with_write(|writer| {
                    writer.put_waiting_continuation(
                        &channels,
                        WaitingContinuation {
                            patterns,
                            continuation,
                            persist,
                            source: consume_ref,
                        },
                    )?;
                    for channel in unique.iter().copied() {
                        writer.add_join(channel, &channels)?;
                    }
                    Ok(())
                })?;
                debug!(
                    target: "weft::engine",
                    arity = channels.len(),
                    seq = sequence_number,
                    "no match; continuation parked"
                );
                Ok(None)
            }
            Some(candidates) => {
                let produces = candidates
                    .iter()
                    .map(|candidate| candidate.datum.source.clone())
                    .collect();
                self.log.prepend(Event::Comm(Comm {
                    consume: consume_ref,
                    produces,
                }));
                self.telemetry.on_consume_comm();

                self.commit_data_removals(&candidates)?;

                let max_source = candidates
                    .iter()
                    .map(|candidate| candidate.datum.source.sequence_number)
                    .max()
                    .unwrap_or(sequence_number);
                let next_sequence = 1 + sequence_number.max(max_source);
                debug!(
                    target: "weft::engine",
                    arity = channels.len(),
                    seq = next_sequence,
                    "consume matched"
                );

                let matched = candidates
                    .into_iter()
                    .map(|candidate| MatchedDatum {
                        value: candidate.datum.value,
                        matched: candidate.result,
                        persist: candidate.datum.persist,
                    })
                    .collect();
                Ok(Some((
                    ContResult {
                        continuation,
                        persist,
                        channels,
                        patterns,
                        sequence_number: next_sequence,
                    },
                    matched,
                )))
            }
        }
    }

    /// Publishes a datum on a channel.
    ///
    /// The join index is consulted for channel groups with parked
    /// continuations that the new datum might complete; the first
    /// continuation whose every pattern can be satisfied fires, its matched
    /// data (this datum included) is returned, and non-persistent state is
    /// removed atomically. With no rendezvous the datum is stored and
    /// `Ok(None)` returned.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Match`] when the matcher fails; the initiating
    ///   produce event remains in the trace, the store is untouched.
    /// - [`EngineError::Store`] on store failure.
    #[allow(clippy::needless_pass_by_value)]
    pub fn produce(
        &self,
        channel: C,
        data: A,
        persist: bool,
        sequence_number: u64,
    ) -> Result<Option<Rendezvous<C, P, A, K, M::Output>>, EngineError<M::Error>> {
        let produce_ref = self
            .codecs
            .produce_ref(&channel, &data, persist, sequence_number);
        let new_datum = Datum {
            value: data,
            persist,
            source: produce_ref.clone(),
        };
        let channel_hash = self.codecs.channel_hash(&channel);

        // The stripe set this call may mutate depends on the join index, but
        // the index entry for this channel can only change under this
        // channel's stripe. So: estimate the set without locks, lock it in
        // ascending order, then re-read and validate coverage. A concurrent
        // consume that grew the index between the two reads forces another
        // round; once the stripe of `channel` is held the index is frozen.
        let (_guard, groups) = loop {
            let estimate = self.store.with_read(|reader| reader.get_joins(&channel))?;
            let stripes = self.produce_stripes(&channel_hash, &estimate);
            let guard = self.locks.lock_stripes(&stripes);
            let fresh = self.store.with_read(|reader| reader.get_joins(&channel))?;
            let required = self.produce_stripes(&channel_hash, &fresh);
            if required.is_subset(&stripes) {
                break (guard, fresh);
            }
            drop(guard);
        };

        self.log.prepend(Event::Produce(produce_ref));

        let raw_groups = self.store.with_read(|reader| {
            let mut raws = Vec::with_capacity(groups.len());
            for group in &groups {
                let continuations = reader.get_waiting_continuations(group)?;
                let mut data_rows: BTreeMap<C, Vec<Datum<A>>> = BTreeMap::new();
                for member in group {
                    if !data_rows.contains_key(member) {
                        data_rows.insert(member.clone(), reader.get_data(member)?);
                    }
                }
                raws.push((group.clone(), continuations, data_rows));
            }
            Ok(raws)
        })?;

        let snapshots: Vec<GroupSnapshot<C, P, A, K>> = {
            let mut prng = self.prng.lock().unwrap_or_else(PoisonError::into_inner);
            raw_groups
                .into_iter()
                .map(|(group_channels, conts, data_rows)| {
                    let mut continuations: Vec<(WaitingContinuation<P, K>, usize)> =
                        conts.into_iter().enumerate().map(|(i, wc)| (wc, i)).collect();
                    prng.shuffle(&mut continuations);

                    let mut shadow: ShadowData<C, A> = BTreeMap::new();
                    for (member, rows) in data_rows {
                        let mut indexed: Vec<(Datum<A>, Option<usize>)> = rows
                            .into_iter()
                            .enumerate()
                            .map(|(index, datum)| (datum, Some(index)))
                            .collect();
                        prng.shuffle(&mut indexed);
                        if member == channel {
                            // The in-flight datum joins the shadow at the
                            // head with no stored index.
                            indexed.insert(0, (new_datum.clone(), None));
                        }
                        shadow.insert(member, indexed);
                    }

                    GroupSnapshot {
                        channels: group_channels,
                        continuations,
                        shadow,
                    }
                })
                .collect()
        };

        let extracted = extract_produce_candidate(&self.matcher, &snapshots).map_err(|e| {
            error!(target: "weft::engine", error = %e, "matcher failed during produce");
            EngineError::Match(e)
        })?;

        match extracted {
            None => {
                self.store
                    .with_write(|writer| writer.put_datum(&channel, new_datum))?;
                debug!(
                    target: "weft::engine",
                    seq = sequence_number,
                    persist,
                    "no waiting continuation; datum stored"
                );
                Ok(None)
            }
            Some(ProduceCandidate {
                channels: group_channels,
                continuation,
                continuation_index,
                data_candidates,
            }) => {
                let produces = data_candidates
                    .iter()
                    .map(|candidate| candidate.datum.source.clone())
                    .collect();
                self.log.prepend(Event::Comm(Comm {
                    consume: continuation.source.clone(),
                    produces,
                }));
                self.telemetry.on_produce_comm();

                self.store.with_write(|writer| {
                    if !continuation.persist {
                        writer.remove_waiting_continuation(&group_channels, continuation_index)?;
                    }
                    let mut ordered: Vec<&DataCandidate<C, A, M::Output>> =
                        data_candidates.iter().collect();
                    ordered.sort_by(|a, b| b.index.cmp(&a.index));
                    for candidate in ordered {
                        if !candidate.datum.persist {
                            if let Some(index) = candidate.index {
                                writer.remove_datum(&candidate.channel, index)?;
                            }
                        }
                        writer.remove_join(&candidate.channel, &group_channels)?;
                    }
                    Ok(())
                })?;

                let max_source = data_candidates
                    .iter()
                    .map(|candidate| candidate.datum.source.sequence_number)
                    .max()
                    .unwrap_or(sequence_number);
                let next_sequence = 1 + continuation.source.sequence_number.max(max_source);
                debug!(
                    target: "weft::engine",
                    arity = group_channels.len(),
                    seq = next_sequence,
                    "produce matched"
                );

                let matched = data_candidates
                    .into_iter()
                    .map(|candidate| MatchedDatum {
                        value: candidate.datum.value,
                        matched: candidate.result,
                        persist: candidate.datum.persist,
                    })
                    .collect();
                Ok(Some((
                    ContResult {
                        continuation: continuation.continuation,
                        persist: continuation.persist,
                        channels: group_channels,
                        patterns: continuation.patterns,
                        sequence_number: next_sequence,
                    },
                    matched,
                )))
            }
        }
    }

    /// Snapshots the store into a content-addressed root and drains the
    /// trace log.
    ///
    /// Takes no locks: the caller is responsible for quiescing in-flight
    /// produces and consumes (or accepting a checkpoint that interleaves
    /// with them at commit granularity).
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn create_checkpoint(&self) -> Result<Checkpoint, EngineError<M::Error>> {
        let root = self.store.checkpoint()?;
        let log = self.log.take();
        self.telemetry.on_checkpoint(&root, log.len());
        debug!(target: "weft::engine", events = log.len(), "checkpoint created");
        Ok(Checkpoint { root, log })
    }

    /// Restores the store to a previous checkpoint root.
    ///
    /// The trace log is cleared: a trace straddling a state swap would pair
    /// COMM events with data that no longer exists.
    ///
    /// # Errors
    ///
    /// Propagates store failures, including
    /// [`StoreError::UnknownRoot`](crate::StoreError::UnknownRoot).
    pub fn reset(&self, root: &Hash) -> Result<(), EngineError<M::Error>> {
        self.store.reset(root)?;
        let _ = self.log.take();
        Ok(())
    }

    /// Drops all state: tables back to empty, trace log cleared.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn clear(&self) -> Result<(), EngineError<M::Error>> {
        self.store.clear()?;
        let _ = self.log.take();
        Ok(())
    }

    /// Returns the data currently at rest on `channel` (insertion order).
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn get_data(&self, channel: &C) -> Result<Vec<Datum<A>>, EngineError<M::Error>> {
        Ok(self.store.with_read(|reader| reader.get_data(channel))?)
    }

    /// Returns the continuations parked on exactly this channel sequence.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn get_waiting_continuations(
        &self,
        channels: &[C],
    ) -> Result<Vec<WaitingContinuation<P, K>>, EngineError<M::Error>> {
        Ok(self
            .store
            .with_read(|reader| reader.get_waiting_continuations(channels))?)
    }

    /// Returns the channel groups `channel` participates in.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn get_joins(&self, channel: &C) -> Result<Vec<Vec<C>>, EngineError<M::Error>> {
        Ok(self.store.with_read(|reader| reader.get_joins(channel))?)
    }

    /// Returns the accumulated trace events (prepend order, most recent
    /// first) without draining them.
    pub fn trace_events(&self) -> Vec<Event> {
        self.log.snapshot()
    }

    /// Removes every non-persistent matched datum, highest stored index
    /// first so earlier indices stay valid under shift semantics.
    fn commit_data_removals(
        &self,
        candidates: &[DataCandidate<C, A, M::Output>],
    ) -> Result<(), EngineError<M::Error>> {
        let mut removals: Vec<(&C, usize)> = candidates
            .iter()
            .filter(|candidate| !candidate.datum.persist)
            .filter_map(|candidate| candidate.index.map(|index| (&candidate.channel, index)))
            .collect();
        removals.sort_by(|a, b| b.1.cmp(&a.1));
        self.store.with_write(|writer| {
            for (channel, index) in &removals {
                writer.remove_datum(channel, *index)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Stripe set a produce on `channel_hash` must hold to commit against
    /// the given candidate groups.
    fn produce_stripes(&self, channel_hash: &Hash, groups: &[Vec<C>]) -> BTreeSet<usize> {
        let mut hashes = vec![*channel_hash];
        for group in groups {
            for member in group {
                hashes.push(self.codecs.channel_hash(member));
            }
        }
        self.locks.stripe_set(hashes.iter())
    }
}
