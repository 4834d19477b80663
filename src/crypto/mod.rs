//! Crypto Module
//!
//! Chunked AES-256-GCM stream wrapped around the codec bytes.
//!
//! ## Responsibilities
//! - Derive a 256-bit key from a caller-supplied secret
//! - Seal plaintext in fixed-size chunks so large mappings stream
//! - Detect wrong keys, tampering and truncation on read
//!
//! ## Stream Format
//! ```text
//! ┌──────────────────┬──────────────────────────┬─────┬──────────────────────────┐
//! │ Nonce Prefix (8) │ Chunk 0                  │ ... │ Chunk N (final)          │
//! └──────────────────┴──────────────────────────┴─────┴──────────────────────────┘
//!
//! Chunk:
//! ┌──────────────────────────────────┬──────────┐
//! │ Ciphertext (≤ 64 KiB)            │ Tag (16) │
//! └──────────────────────────────────┴──────────┘
//!
//! Nonce(i) = prefix (8) ‖ i as u32 big-endian (4)
//! AAD(i)   = [1] for the final chunk, [0] otherwise
//! ```
//!
//! Every chunk except the last carries exactly 64 KiB of plaintext. Empty
//! plaintext is a single empty final chunk, so every stream has at least one.

mod cipher;
mod stream;

pub use cipher::Cipher;
pub use stream::{decrypt_read, decrypt_read_async, encrypt_write, encrypt_write_async};

/// Random per-stream nonce prefix
pub const HEADER_LEN: usize = 8;

/// AES-GCM authentication tag
pub const TAG_LEN: usize = 16;

/// Plaintext bytes per chunk
pub const CHUNK_LEN: usize = 64 * 1024;

/// Ciphertext bytes per full chunk
pub const SEALED_CHUNK_LEN: usize = CHUNK_LEN + TAG_LEN;

/// Minimum overhead of a stream: the header plus the final chunk's tag.
/// Callers pre-sizing buffers subtract this from their estimate.
pub const RESERVED_HEADER_SIZE: usize = HEADER_LEN + TAG_LEN;

/// Exact stream length for `plaintext_len` bytes of input
pub fn ciphertext_len(plaintext_len: usize) -> usize {
    let chunks = plaintext_len.div_ceil(CHUNK_LEN).max(1);
    HEADER_LEN + plaintext_len + chunks * TAG_LEN
}

/// Plaintext carried by a well-formed stream of `ciphertext_len` bytes
pub fn plaintext_capacity(ciphertext_len: usize) -> usize {
    if ciphertext_len < RESERVED_HEADER_SIZE {
        return 0;
    }
    let body = ciphertext_len - HEADER_LEN;
    let full_chunks = body / SEALED_CHUNK_LEN;
    let remainder = body % SEALED_CHUNK_LEN;
    full_chunks * CHUNK_LEN + remainder.saturating_sub(TAG_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_inverts_length() {
        for len in [0, 1, CHUNK_LEN - 1, CHUNK_LEN, CHUNK_LEN + 1, 3 * CHUNK_LEN + 17] {
            assert_eq!(plaintext_capacity(ciphertext_len(len)), len, "len={}", len);
        }
    }

    #[test]
    fn test_empty_plaintext_costs_reserved_size() {
        assert_eq!(ciphertext_len(0), RESERVED_HEADER_SIZE);
    }
}
