// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Telemetry sink trait for observability without coupling to I/O.
//!
//! The engine reports rendezvous counters and checkpoint roots through this
//! trait, allowing adapters to decide how to handle them (metrics registry,
//! stdout, discard). This keeps I/O concerns outside the engine core.

use crate::ident::Hash;

/// Telemetry sink for observing engine events.
///
/// All methods have default no-op implementations, so callers implement only
/// the events they care about. The two comm counters are the engine's
/// canonical metrics: one increment per committed rendezvous, attributed to
/// whichever side completed it.
pub trait TelemetrySink: Send + Sync {
    /// Called when a consume call commits a rendezvous (`comm.consume`).
    fn on_consume_comm(&self) {}

    /// Called when a produce call commits a rendezvous (`comm.produce`).
    fn on_produce_comm(&self) {}

    /// Called when a checkpoint is created.
    ///
    /// # Arguments
    /// * `root` - The content-addressed root of the checkpointed state
    /// * `events` - Number of trace events drained into the checkpoint
    fn on_checkpoint(&self, _root: &Hash, _events: usize) {}
}

/// A no-op telemetry sink that discards all events.
///
/// This is the default when no telemetry is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {}
