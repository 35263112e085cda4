//! Pair seed derivation.
//!
use sha2::{Digest, Sha256};

/// A 32-byte seed shared by the two endpoints of a client pair.
///
/// Both sides derive the identical seed from the shared secret and the
/// lexicographically sorted pair of client identifiers, so the pad one side
/// adds is exactly the pad the other side subtracts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairSeed([u8; PairSeed::LENGTH]);

impl PairSeed {
    pub const LENGTH: usize = 32;

    /// Derives the seed for the unordered pair `{a, b}`.
    ///
    /// The digest input is `secret || "|pair|" || low || "|" || high` with
    /// `(low, high)` the identifiers in lexicographic order; the separator
    /// and the ordering are part of the wire-level contract.
    pub fn derive(secret: &[u8], a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(b"|pair|");
        hasher.update(low.as_bytes());
        hasher.update(b"|");
        hasher.update(high.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Gets this seed as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Gets this seed as an array.
    pub fn as_array(&self) -> [u8; Self::LENGTH] {
        self.0
    }
}
