// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stored records and match results.

use crate::event::{Consume, Produce};

/// A published value at rest on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datum<A> {
    /// The published payload.
    pub value: A,
    /// When `true`, matching returns the datum without consuming it.
    pub persist: bool,
    /// Reference to the produce call that published it.
    pub source: Produce,
}

/// A continuation at rest, waiting for data on a tuple of channels.
///
/// `patterns` corresponds positionally to the channel sequence the
/// continuation is stored under; the store enforces nothing here — arity is
/// validated at the consume entry point and preserved thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingContinuation<P, K> {
    /// One pattern per channel in the storage key, positionally.
    pub patterns: Vec<P>,
    /// The opaque continuation returned to the caller on a match.
    pub continuation: K,
    /// When `true`, matching returns the continuation without removing it.
    pub persist: bool,
    /// Reference to the consume call that stored it.
    pub source: Consume,
}

/// A tentative binding of one datum to one pattern during extraction.
#[derive(Debug, Clone)]
pub struct DataCandidate<C, A, R> {
    /// Channel the datum was read from.
    pub channel: C,
    /// The selected datum.
    pub datum: Datum<A>,
    /// The matcher's extracted result for this binding.
    pub result: R,
    /// Position of the datum in the channel's stored list at snapshot time.
    ///
    /// `None` marks the in-flight datum of the produce call currently
    /// matching: it was never stored, so the commit path must not (and,
    /// through this type, cannot) issue a removal for it.
    pub index: Option<usize>,
}

/// A complete tentative rendezvous found on the produce path.
#[derive(Debug, Clone)]
pub struct ProduceCandidate<C, P, A, K, R> {
    /// The channel group the continuation is stored under.
    pub channels: Vec<C>,
    /// The waiting continuation to fire.
    pub continuation: WaitingContinuation<P, K>,
    /// Position of the continuation in its stored list at snapshot time.
    pub continuation_index: usize,
    /// One binding per channel in the group, positionally.
    pub data_candidates: Vec<DataCandidate<C, A, R>>,
}

/// The continuation side of a committed rendezvous, returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContResult<C, P, K> {
    /// The fired continuation.
    pub continuation: K,
    /// Whether the continuation remains stored (persistent consume).
    pub persist: bool,
    /// The channel group it was waiting on.
    pub channels: Vec<C>,
    /// The patterns it was waiting with.
    pub patterns: Vec<P>,
    /// `1 + max` over the sequence numbers of every participating event.
    pub sequence_number: u64,
}

/// One matched datum returned beside a [`ContResult`], in pattern order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedDatum<A, R> {
    /// The datum payload (removed from the store unless persistent).
    pub value: A,
    /// The matcher's extracted result for this binding.
    pub matched: R,
    /// Whether the datum remains stored (persistent produce).
    pub persist: bool,
}
