//! Deterministic pseudo-random float generation for the masking pads.
//!
use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};

/// Floats produced per SHA-256 digest: four big-endian u64 chunks.
const FLOATS_PER_DIGEST: usize = 4;

/// Expands a seed into `length` pseudo-random floats in `[-0.5, 0.5)`.
///
/// The keystream is SHA-256 in counter mode: block `c` is
/// `SHA-256(seed || be32(c))`, split into four big-endian u64 chunks, each
/// mapped to `u / 2^64 - 0.5`. The expansion is byte-exact across
/// implementations; a prefix of a longer expansion equals the shorter one.
pub fn expand(seed: &[u8], length: usize) -> Vec<f64> {
    let mut output = Vec::with_capacity(length);
    let mut counter: u32 = 0;
    let mut block = [0u8; 4];

    while output.len() < length {
        BigEndian::write_u32(&mut block, counter);
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(block);
        let digest = hasher.finalize();

        for chunk in digest.chunks_exact(8).take(length - output.len()) {
            let value = BigEndian::read_u64(chunk);
            output.push(value as f64 / 2f64.powi(64) - 0.5);
        }
        counter += 1;
    }
    output
}
