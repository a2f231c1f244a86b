// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Trace event references.
//!
//! Every produce and consume call is traced by a compact reference built
//! from domain-separated digests of its inputs — never the inputs
//! themselves, so the trace stays fixed-size per event regardless of payload
//! size. A successful rendezvous additionally records a [`Comm`] pairing the
//! consume reference with the produce references it consumed.
//!
//! References are part of the deterministic boundary: the same inputs at the
//! same sequence number always produce byte-identical references, so traces
//! can be compared across runs and machines.

use crate::ident::Hash;

/// Reference to one produce operation: the originating channel and payload
/// by digest, plus the persistence flag and caller-supplied sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Produce {
    /// Digest of the encoded channel.
    pub channel_hash: Hash,
    /// Digest of the encoded payload.
    pub data_hash: Hash,
    /// Whether the datum survives matching.
    pub persist: bool,
    /// Caller-supplied sequence number.
    pub sequence_number: u64,
}

/// Reference to one consume operation: the channel sequence, pattern
/// sequence, and continuation by digest, plus persistence and sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Consume {
    /// Digest of the encoded channel sequence (order-sensitive).
    pub channels_hash: Hash,
    /// Digest of the encoded pattern sequence (positionally tied to the
    /// channel sequence).
    pub patterns_hash: Hash,
    /// Digest of the encoded continuation.
    pub continuation_hash: Hash,
    /// Whether the waiting continuation survives matching.
    pub persist: bool,
    /// Caller-supplied sequence number.
    pub sequence_number: u64,
}

/// One successful rendezvous: a consume paired with the produces whose data
/// satisfied its patterns, in pattern order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comm {
    /// The consume side of the rendezvous.
    pub consume: Consume,
    /// The produce whose datum satisfied each pattern, positionally.
    pub produces: Vec<Produce>,
}

/// Tagged trace event.
///
/// Initiating [`Produce`]/[`Consume`] events are appended before matching
/// runs; a [`Comm`] is appended only when a rendezvous commits. A matcher
/// error therefore leaves the initiating event in the trace with no COMM —
/// the trace records attempts, not only commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A produce call entered its critical section.
    Produce(Produce),
    /// A consume call entered its critical section.
    Consume(Consume),
    /// A rendezvous committed.
    Comm(Comm),
}
