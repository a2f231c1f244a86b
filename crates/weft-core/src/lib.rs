// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! weft-core: transactional tuple-space matching engine.
//!
//! Producers publish data on channels; consumers park continuations with
//! one pattern per channel across a tuple of channels. When either side
//! arrives and the other can satisfy it, the engine atomically removes the
//! matched state and hands the continuation back paired with the matched
//! data; otherwise the arriving side is stored. Every attempt is traced
//! into an append-only event log that drains into content-addressed
//! checkpoints.
//!
//! # Determinism contract
//!
//! - Trace references and checkpoint roots are BLAKE3 digests over
//!   canonical byte streams (domain-separated, sorted table order, 8-byte
//!   little-endian length prefixes). Same state, same bytes, same root.
//! - Candidate order is shuffled before matching — fairness, not
//!   correctness — from a seed-controlled PRNG, so a pinned seed replays a
//!   run's match decisions exactly.
//! - Which calls may overlap is decided by frozen stripe routing over
//!   channel hashes; everything a call commits happens atomically in one
//!   store transaction.
//!
//! The engine is parameterised over four opaque value spaces (channels,
//! patterns, data, continuations) with caller-supplied [`Codecs`], a
//! pluggable [`Match`] implementation, and a [`TupleStore`] backend
//! ([`MemoryStore`] ships in-crate).
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
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::cast_possible_truncation,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::significant_drop_tightening,
    clippy::use_self
)]

/// Scoped worker pool for offloading engine calls.
pub mod exec;

mod checkpoint;
mod codec;
mod engine_impl;
mod event;
mod event_log;
mod extract;
mod ident;
mod locks;
mod matcher;
mod memory;
mod prng;
mod record;
mod store;
mod telemetry;

// Re-exports for stable public API
pub use checkpoint::Checkpoint;
pub use codec::{Codec, CodecError, Codecs};
pub use engine_impl::{Engine, EngineBuilder, EngineError, Rendezvous};
pub use event::{Comm, Consume, Event, Produce};
pub use ident::{BranchId, Hash};
pub use matcher::Match;
pub use memory::MemoryStore;
pub use prng::Prng;
pub use record::{
    ContResult, DataCandidate, Datum, MatchedDatum, ProduceCandidate, WaitingContinuation,
};
pub use store::{StoreError, StoreReader, StoreWriter, TupleStore};
pub use telemetry::{NullTelemetrySink, TelemetrySink};
