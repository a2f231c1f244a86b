// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Codec boundaries for the engine's four opaque value spaces.
//!
//! The engine is parameterised over channels, patterns, data, and
//! continuations without ever inspecting them. Everything that needs bytes —
//! event-reference digests, canonical snapshot encoding, checkpoint restore —
//! goes through an explicit [`Codecs`] dispatch table supplied at
//! construction.
//!
//! Laws / invariants:
//! - Round-trip must be total on client-produced values:
//!   `decode(encode(x)) == x`.
//! - Encoding must be deterministic: the same value always encodes to the
//!   same bytes. Event references and checkpoint roots inherit their
//!   stability from this law; a codec that encodes a `HashMap` in iteration
//!   order breaks trace identity.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::event::{Consume, Produce};
use crate::ident::{hash_sequence, hash_value, Hash};

/// Bidirectional, deterministic serializer for one value space.
pub trait Codec<T>: Send + Sync {
    /// Encodes a value to its canonical bytes.
    fn encode(&self, value: &T) -> Bytes;

    /// Decodes canonical bytes back into a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the bytes are not a canonical encoding
    /// produced by [`encode`](Codec::encode).
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Error returned by strict decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The byte length did not match the expected encoding.
    #[error("encoded length mismatch: expected {expected} bytes, found {found}")]
    LengthMismatch {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        found: usize,
    },
    /// The bytes were structurally invalid for this codec.
    #[error("malformed encoding: {0}")]
    Malformed(&'static str),
}

/// Explicit dispatch table bundling one codec per value space.
///
/// Cheap to clone (four `Arc`s); the engine and the store each hold one.
pub struct Codecs<C, P, A, K> {
    /// Channel codec.
    pub channel: Arc<dyn Codec<C>>,
    /// Pattern codec.
    pub pattern: Arc<dyn Codec<P>>,
    /// Datum payload codec.
    pub datum: Arc<dyn Codec<A>>,
    /// Continuation codec.
    pub continuation: Arc<dyn Codec<K>>,
}

impl<C, P, A, K> Clone for Codecs<C, P, A, K> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            pattern: Arc::clone(&self.pattern),
            datum: Arc::clone(&self.datum),
            continuation: Arc::clone(&self.continuation),
        }
    }
}

impl<C, P, A, K> std::fmt::Debug for Codecs<C, P, A, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codecs").finish_non_exhaustive()
    }
}

impl<C, P, A, K> Codecs<C, P, A, K> {
    /// Bundles four codecs into a dispatch table.
    pub fn new(
        channel: Arc<dyn Codec<C>>,
        pattern: Arc<dyn Codec<P>>,
        datum: Arc<dyn Codec<A>>,
        continuation: Arc<dyn Codec<K>>,
    ) -> Self {
        Self {
            channel,
            pattern,
            datum,
            continuation,
        }
    }

    /// Domain-separated digest of a single channel.
    pub fn channel_hash(&self, channel: &C) -> Hash {
        hash_value(b"weft:chan:", &self.channel.encode(channel))
    }

    /// Domain-separated digest of an ordered channel sequence.
    pub fn channels_hash(&self, channels: &[C]) -> Hash {
        hash_sequence(
            b"weft:chans:",
            channels
                .iter()
                .map(|c| self.channel.encode(c))
                .collect::<Vec<_>>()
                .into_iter(),
        )
    }

    /// Domain-separated digest of an ordered pattern sequence.
    pub fn patterns_hash(&self, patterns: &[P]) -> Hash {
        hash_sequence(
            b"weft:pats:",
            patterns
                .iter()
                .map(|p| self.pattern.encode(p))
                .collect::<Vec<_>>()
                .into_iter(),
        )
    }

    /// Domain-separated digest of a datum payload.
    pub fn datum_hash(&self, datum: &A) -> Hash {
        hash_value(b"weft:datum:", &self.datum.encode(datum))
    }

    /// Domain-separated digest of a continuation.
    pub fn continuation_hash(&self, continuation: &K) -> Hash {
        hash_value(b"weft:cont:", &self.continuation.encode(continuation))
    }

    /// Builds the trace reference for a produce call.
    pub fn produce_ref(&self, channel: &C, data: &A, persist: bool, sequence_number: u64) -> Produce {
        Produce {
            channel_hash: self.channel_hash(channel),
            data_hash: self.datum_hash(data),
            persist,
            sequence_number,
        }
    }

    /// Builds the trace reference for a consume call.
    pub fn consume_ref(
        &self,
        channels: &[C],
        patterns: &[P],
        continuation: &K,
        persist: bool,
        sequence_number: u64,
    ) -> Consume {
        Consume {
            channels_hash: self.channels_hash(channels),
            patterns_hash: self.patterns_hash(patterns),
            continuation_hash: self.continuation_hash(continuation),
            persist,
            sequence_number,
        }
    }
}
