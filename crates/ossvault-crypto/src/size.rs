//! Envelope size arithmetic
//!
//! Some backends need the content length before the body is produced (S3
//! PUT without chunked transfer). The sealed envelope adds a fixed header
//! plus one tag per chunk, so the length is computable up front:
//!
//! ```text
//! sealed = HEADER + plain + ceil(plain / chunk_size) * TAG
//! ```

use crate::{HEADER_SIZE, TAG_SIZE};

/// Ciphertext length for `plain` plaintext bytes. Zero stays zero.
pub fn sealed_size(plain: u64, chunk_size: usize) -> u64 {
    if plain == 0 {
        return 0;
    }
    let blocks = plain.div_ceil(chunk_size as u64);
    HEADER_SIZE as u64 + plain + blocks * TAG_SIZE as u64
}

/// Plaintext length for a `sealed`-byte envelope (inverse of [`sealed_size`]).
///
/// Lengths that cannot be a well-formed envelope are clamped, not rejected;
/// decryption is what detects a bad envelope.
pub fn opened_size(sealed: u64, chunk_size: usize) -> u64 {
    let body = sealed.saturating_sub(HEADER_SIZE as u64);
    let blocks = body.div_ceil((chunk_size + TAG_SIZE) as u64);
    body.saturating_sub(blocks * TAG_SIZE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 4096;

    #[test]
    fn test_sealed_size_formula() {
        let cases = [
            (0u64, 0u64),
            (1, 24 + 1 + 16),
            (CHUNK as u64 - 1, 24 + 4095 + 16),
            (CHUNK as u64, 24 + 4096 + 16),
            (CHUNK as u64 + 1, 24 + 4097 + 2 * 16),
            (10 * CHUNK as u64, 24 + 40960 + 10 * 16),
            (10_000, 24 + 10_000 + 3 * 16),
        ];
        for (plain, expected) in cases {
            assert_eq!(sealed_size(plain, CHUNK), expected, "plaintext size {plain}");
        }
    }

    #[test]
    fn test_opened_size_inverts_sealed_size() {
        for plain in [1u64, 17, 4095, 4096, 4097, 8192, 10_000, 1 << 20] {
            for chunk in [41usize, 1000, CHUNK, 8192] {
                assert_eq!(opened_size(sealed_size(plain, chunk), chunk), plain);
            }
        }
    }

    #[test]
    fn test_opened_size_of_empty_stream_envelope() {
        // header + one empty final chunk
        assert_eq!(opened_size(40, CHUNK), 0);
        assert_eq!(opened_size(0, CHUNK), 0);
    }
}
