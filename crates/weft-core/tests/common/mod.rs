// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use weft_core::{
    BranchId, Codec, CodecError, Codecs, Engine, EngineBuilder, Hash, Match, MemoryStore,
    TelemetrySink,
};

/// Little-endian `i32` codec used for all four value spaces in tests.
pub struct I32Codec;

impl Codec<i32> for I32Codec {
    fn encode(&self, value: &i32) -> Bytes {
        Bytes::copy_from_slice(&value.to_le_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<i32, CodecError> {
        let arr: [u8; 4] = bytes.try_into().map_err(|_| CodecError::LengthMismatch {
            expected: 4,
            found: bytes.len(),
        })?;
        Ok(i32::from_le_bytes(arr))
    }
}

/// The acceptance-scenario matcher: a pattern matches exactly its own value.
pub struct Equality;

impl Match<i32, i32> for Equality {
    type Output = i32;
    type Error = Infallible;

    fn check(&self, pattern: &i32, data: &i32) -> Result<Option<i32>, Infallible> {
        Ok((pattern == data).then_some(*data))
    }
}

/// Matcher failure used by error-path tests.
#[derive(Debug, thiserror::Error)]
#[error("poisoned datum {0}")]
pub struct PoisonedDatum(pub i32);

/// Equality matcher that fails outright on one designated datum value.
pub struct FailingOn(pub i32);

impl Match<i32, i32> for FailingOn {
    type Output = i32;
    type Error = PoisonedDatum;

    fn check(&self, pattern: &i32, data: &i32) -> Result<Option<i32>, PoisonedDatum> {
        if *data == self.0 {
            return Err(PoisonedDatum(*data));
        }
        Ok((pattern == data).then_some(*data))
    }
}

/// Telemetry sink counting comm events and checkpoints.
#[derive(Debug, Default)]
pub struct CountingSink {
    pub consume_comms: AtomicU64,
    pub produce_comms: AtomicU64,
    pub checkpoints: AtomicU64,
}

impl TelemetrySink for CountingSink {
    fn on_consume_comm(&self) {
        self.consume_comms.fetch_add(1, Ordering::Relaxed);
    }

    fn on_produce_comm(&self) {
        self.produce_comms.fetch_add(1, Ordering::Relaxed);
    }

    fn on_checkpoint(&self, _root: &Hash, _events: usize) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }
}

pub type IntStore = MemoryStore<i32, i32, i32, i32>;
pub type IntEngine<M> = Engine<i32, i32, i32, i32, M, IntStore>;

/// The test codec table: one `i32` codec for all four spaces.
pub fn codecs() -> Codecs<i32, i32, i32, i32> {
    let codec = Arc::new(I32Codec);
    Codecs::new(codec.clone(), codec.clone(), codec.clone(), codec)
}

/// Engine on the default branch with the equality matcher and a pinned
/// shuffle seed.
pub fn engine() -> IntEngine<Equality> {
    engine_on(BranchId::default(), 42)
}

/// Engine with explicit branch and shuffle seed.
pub fn engine_on(branch: BranchId, seed: u64) -> IntEngine<Equality> {
    let codecs = codecs();
    let store = MemoryStore::new(branch, codecs.clone());
    EngineBuilder::new(store, Equality, codecs)
        .shuffle_seed(seed)
        .build()
}

/// Engine with an arbitrary matcher.
pub fn engine_with_matcher<M>(matcher: M) -> IntEngine<M>
where
    M: Match<i32, i32> + Send + Sync,
{
    let codecs = codecs();
    let store = MemoryStore::new(BranchId::default(), codecs.clone());
    EngineBuilder::new(store, matcher, codecs)
        .shuffle_seed(42)
        .build()
}

/// Engine wired to a counting telemetry sink.
pub fn engine_with_telemetry(sink: Arc<CountingSink>) -> IntEngine<Equality> {
    let codecs = codecs();
    let store = MemoryStore::new(BranchId::default(), codecs.clone());
    EngineBuilder::new(store, Equality, codecs)
        .shuffle_seed(42)
        .telemetry(sink)
        .build()
}
