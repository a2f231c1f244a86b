// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Striped lock manager for matching critical sections.
//!
//! # Stripe Routing Specification (FROZEN)
//!
//! ```text
//! stripe = LE_u64(channel_hash[0..8]) & (NUM_STRIPES - 1)
//! ```
//!
//! Channels are routed to stripes by their content hash, so two operations
//! collide exactly when their channel sets can touch the same store rows
//! (modulo stripe aliasing, which only ever over-serializes — never
//! under-serializes).
//!
//! Multi-stripe acquisition is always in ascending stripe order. A total
//! acquisition order over a fixed set is deadlock-free; callers that cannot
//! know their full set up front (the produce path, whose set depends on the
//! join index) must therefore compute a candidate set, lock it, and validate
//! the set is still sufficient before proceeding.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ident::Hash;

/// Number of lock stripes (power of two for fast modulo).
///
/// 256 stripes keeps collisions rare at typical channel cardinalities while
/// bounding the manager's footprint to a fixed array.
pub(crate) const NUM_STRIPES: usize = 256;

const _: () = assert!(
    NUM_STRIPES.is_power_of_two(),
    "NUM_STRIPES must be a power of two"
);

const STRIPE_MASK: u64 = (NUM_STRIPES - 1) as u64;

/// Compute the stripe of a channel hash.
///
/// Same hash, same stripe, on every platform. This routing is frozen: the
/// serialization guarantees of every committed trace depend on which
/// operations excluded each other.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn stripe_of(hash: &Hash) -> usize {
    let first_8: [u8; 8] = [
        hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
    ];
    let val = u64::from_le_bytes(first_8);
    (val & STRIPE_MASK) as usize
}

/// Striped mutual exclusion over channel hashes.
#[derive(Debug)]
pub(crate) struct LockManager {
    stripes: Box<[Mutex<()>]>,
}

/// Guard holding one or more stripe locks; released on drop, in reverse
/// acquisition order.
#[derive(Debug)]
pub(crate) struct StripeGuard<'a> {
    guards: Vec<MutexGuard<'a, ()>>,
}

impl StripeGuard<'_> {
    /// Number of stripes held.
    #[cfg(test)]
    pub(crate) fn held(&self) -> usize {
        self.guards.len()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    /// Creates a manager with [`NUM_STRIPES`] free stripes.
    pub(crate) fn new() -> Self {
        Self {
            stripes: (0..NUM_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Collects the stripe set of a sequence of channel hashes.
    pub(crate) fn stripe_set<'h>(&self, hashes: impl IntoIterator<Item = &'h Hash>) -> BTreeSet<usize> {
        hashes.into_iter().map(stripe_of).collect()
    }

    /// Acquires the given stripes in ascending order.
    ///
    /// The set is already sorted and deduplicated by construction
    /// (`BTreeSet`), which is what makes the acquisition deadlock-free
    /// against every other caller of this manager.
    pub(crate) fn lock_stripes(&self, stripes: &BTreeSet<usize>) -> StripeGuard<'_> {
        let guards = stripes
            .iter()
            .map(|&stripe| {
                self.stripes[stripe]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
            })
            .collect();
        StripeGuard { guards }
    }

    /// Acquires the stripes covering a channel sequence (consume path).
    pub(crate) fn lock_channels(&self, hashes: &[Hash]) -> StripeGuard<'_> {
        self.lock_stripes(&self.stripe_set(hashes.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Routing test vectors. If these fail, stripe routing changed and every
    // serialization guarantee in the trace history is suspect.

    #[test]
    fn test_vector_deadbeef() {
        let mut hash = [0u8; 32];
        hash[0..8].copy_from_slice(&[0xBE, 0xBA, 0xFE, 0xCA, 0xEF, 0xBE, 0xAD, 0xDE]);
        // LE_u64 of first 8 bytes = 0xDEADBEEFCAFEBABE; & 0xFF = 0xBE = 190.
        assert_eq!(stripe_of(&hash), 190, "REGRESSION: stripe routing changed!");
    }

    #[test]
    fn test_vector_all_zeros() {
        assert_eq!(stripe_of(&[0u8; 32]), 0, "REGRESSION: stripe routing changed!");
    }

    #[test]
    fn test_vector_only_first_8_bytes_matter() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[0..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        b[0..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        a[8] = 0xAA;
        b[31] = 0xBB;
        assert_eq!(stripe_of(&a), stripe_of(&b));
    }

    #[test]
    fn overlapping_sets_share_a_stripe() {
        let manager = LockManager::new();
        let shared = [7u8; 32];
        let other = [9u8; 32];
        let consume_set = manager.stripe_set([shared, other].iter());
        let produce_set = manager.stripe_set([shared].iter());
        assert!(!consume_set.is_disjoint(&produce_set));
    }

    #[test]
    fn duplicate_hashes_collapse_to_one_guard() {
        let manager = LockManager::new();
        let hash = [3u8; 32];
        let guard = manager.lock_channels(&[hash, hash, hash]);
        assert_eq!(guard.held(), 1);
    }

    #[test]
    fn disjoint_stripes_do_not_block() {
        let manager = LockManager::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[0] = 1;
        b[0] = 2;
        let _first = manager.lock_channels(&[a]);
        // Would deadlock here if stripes aliased.
        let _second = manager.lock_channels(&[b]);
    }
}
