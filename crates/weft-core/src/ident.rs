// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities.
use blake3::Hasher;
use bytes::Bytes;

/// Canonical 256-bit hash used throughout the engine for addressing
/// channels, patterns, data, continuations, and checkpoint roots.
pub type Hash = [u8; 32];

/// Opaque branch identifier namespacing a store's checkpoint universe.
///
/// Two stores constructed over distinct branches never produce colliding
/// checkpoint roots, even for identical table contents: the branch bytes are
/// mixed into the canonical snapshot stream before hashing. The identifier
/// itself is opaque — any byte string is a valid branch.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BranchId(Bytes);

impl BranchId {
    /// Constructs a branch identifier from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw branch bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for BranchId {
    /// The conventional default branch, `main`.
    fn default() -> Self {
        Self(Bytes::from_static(b"main"))
    }
}

/// Produces a stable, domain-separated digest of a single encoded value.
///
/// The `domain` prefix prevents "same bytes, different meaning" collisions
/// between the engine's value spaces (a channel encoding equal to a pattern
/// encoding must not hash identically).
pub(crate) fn hash_value(domain: &'static [u8], bytes: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(domain);
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Produces a stable, domain-separated digest of an encoded value sequence.
///
/// The encoding is canonical: an 8-byte little-endian element count followed
/// by each element as an 8-byte little-endian length prefix plus the exact
/// encoded bytes. Changing any of these rules changes every sequence hash
/// and is a breaking change to trace identity.
pub(crate) fn hash_sequence<I>(domain: &'static [u8], elements: I) -> Hash
where
    I: ExactSizeIterator<Item = Bytes>,
{
    let mut hasher = Hasher::new();
    hasher.update(domain);
    hasher.update(&(elements.len() as u64).to_le_bytes());
    for bytes in elements {
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation_prevents_cross_space_collisions() {
        let payload = b"same bytes";
        let a = hash_value(b"weft:chan:", payload);
        let b = hash_value(b"weft:pat:", payload);
        let c = hash_value(b"weft:datum:", payload);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn sequence_hash_is_injective_on_element_boundaries() {
        // ["ab", "c"] and ["a", "bc"] must not collide: the length prefixes
        // bind element boundaries into the digest.
        let left = hash_sequence(
            b"weft:chans:",
            vec![Bytes::from_static(b"ab"), Bytes::from_static(b"c")].into_iter(),
        );
        let right = hash_sequence(
            b"weft:chans:",
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"bc")].into_iter(),
        );
        assert_ne!(left, right);
    }

    #[test]
    fn default_branch_is_main() {
        assert_eq!(BranchId::default().as_bytes(), b"main");
    }
}
