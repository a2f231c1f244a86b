// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Speculative multi-channel candidate extraction.
//!
//! Extraction runs against *shadows*: read-time snapshots of per-channel
//! data, shuffled for fairness, with each entry carrying its stored index.
//! Consuming an entry from the shadow marks it bound for the remainder of
//! the attempt — the store itself is untouched until the engine commits.

use std::collections::BTreeMap;

use crate::matcher::Match;
use crate::record::{DataCandidate, Datum, ProduceCandidate, WaitingContinuation};

/// Per-channel shadow: shuffled `(datum, stored index)` pairs.
///
/// `None` indices mark the in-flight datum of the produce call currently
/// matching (never stored, so never removed).
pub(crate) type ShadowData<C, A> = BTreeMap<C, Vec<(Datum<A>, Option<usize>)>>;

/// One candidate group on the produce path: the stored channel sequence,
/// its continuations (shuffled, with stored indices), and the shadow of
/// every member channel's data.
pub(crate) struct GroupSnapshot<C, P, A, K> {
    pub(crate) channels: Vec<C>,
    pub(crate) continuations: Vec<(WaitingContinuation<P, K>, usize)>,
    pub(crate) shadow: ShadowData<C, A>,
}

/// Attempts to bind every `(channel, pattern)` pair to a distinct datum.
///
/// Pairs are tried in the given order; each channel's shadow list is scanned
/// in its current (shuffled) order and the first matching entry is bound and
/// removed from the shadow, so a single datum can never satisfy two patterns
/// within one attempt. Any unsatisfiable pair makes the whole attempt yield
/// `Ok(None)`.
///
/// # Errors
///
/// A matcher failure aborts the extraction immediately — partial bindings
/// are discarded along with the shadow.
pub(crate) fn extract_data_candidates<C, P, A, M>(
    matcher: &M,
    pairs: &[(C, P)],
    shadow: &mut ShadowData<C, A>,
) -> Result<Option<Vec<DataCandidate<C, A, M::Output>>>, M::Error>
where
    C: Clone + Ord,
    M: Match<P, A>,
{
    let mut candidates = Vec::with_capacity(pairs.len());
    for (channel, pattern) in pairs {
        let Some(entries) = shadow.get_mut(channel) else {
            return Ok(None);
        };
        let mut selected = None;
        for (position, (datum, _)) in entries.iter().enumerate() {
            if let Some(result) = matcher.check(pattern, &datum.value)? {
                selected = Some((position, result));
                break;
            }
        }
        let Some((position, result)) = selected else {
            return Ok(None);
        };
        let (datum, index) = entries.remove(position);
        candidates.push(DataCandidate {
            channel: channel.clone(),
            datum,
            result,
            index,
        });
    }
    Ok(Some(candidates))
}

/// Searches the candidate groups for the first continuation whose patterns
/// can all be satisfied.
///
/// Groups are tried in the given order and the search stops at the first
/// success — remaining groups are never examined. Each continuation attempt
/// runs against a fresh copy of its group's shadow, so a failed attempt
/// leaves no bindings behind for the next one.
///
/// # Errors
///
/// Matcher failures bubble up immediately.
pub(crate) fn extract_produce_candidate<C, P, A, K, M>(
    matcher: &M,
    groups: &[GroupSnapshot<C, P, A, K>],
) -> Result<Option<ProduceCandidate<C, P, A, K, M::Output>>, M::Error>
where
    C: Clone + Ord,
    P: Clone,
    A: Clone,
    K: Clone,
    M: Match<P, A>,
{
    for group in groups {
        for (continuation, continuation_index) in &group.continuations {
            let pairs: Vec<(C, P)> = group
                .channels
                .iter()
                .cloned()
                .zip(continuation.patterns.iter().cloned())
                .collect();
            let mut shadow = group.shadow.clone();
            if let Some(data_candidates) = extract_data_candidates(matcher, &pairs, &mut shadow)? {
                return Ok(Some(ProduceCandidate {
                    channels: group.channels.clone(),
                    continuation: continuation.clone(),
                    continuation_index: *continuation_index,
                    data_candidates,
                }));
            }
        }
    }
    Ok(None)
}
