// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Matcher seam between the engine and the pattern language.
//!
//! The engine never interprets patterns. It composes [`Match::check`] calls
//! over candidate data and commits whatever the matcher accepts. This is the
//! single extension point a surface language plugs into.

/// Pluggable pattern matcher over `(P, A)`.
///
/// Implementations must be pure: deterministic for fixed inputs, no side
/// effects. The engine may invoke `check` any number of times against
/// snapshots that are later discarded, so an impure matcher would observe
/// calls that never commit.
///
/// `Output` is the matcher-extracted result handed back to the caller beside
/// each matched datum (for an equality matcher this is simply the datum).
/// `Error` aborts the entire extraction and propagates to the caller; the
/// engine commits nothing on that path.
pub trait Match<P, A> {
    /// Result extracted from a successful match.
    type Output;
    /// Matcher-defined failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Tests `pattern` against `data`.
    ///
    /// Returns `Ok(Some(output))` on a match, `Ok(None)` on a clean
    /// non-match.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the matcher itself fails (malformed pattern,
    /// resource exhaustion in the pattern language, …) — a failure is not a
    /// non-match and aborts the whole extraction.
    fn check(&self, pattern: &P, data: &A) -> Result<Option<Self::Output>, Self::Error>;
}
