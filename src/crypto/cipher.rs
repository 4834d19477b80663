//! Cipher
//!
//! Key derivation plus the per-chunk seal/open state machines shared by the
//! blocking and async stream drivers.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

use super::{CHUNK_LEN, HEADER_LEN, TAG_LEN};

const FINAL_CHUNK: [u8; 1] = [1];
const INNER_CHUNK: [u8; 1] = [0];

/// AES-256-GCM key derived from a caller secret
pub struct Cipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl Cipher {
    /// Derive the key as SHA-256 of the secret
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(VaultError::Config(
                "encryption key must not be empty".to_string(),
            ));
        }

        let key_bytes = digest(&SHA256, secret.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, key_bytes.as_ref())
            .map_err(|_| VaultError::Crypto("failed to build AES-256-GCM key".to_string()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Fresh random nonce prefix for a new stream
    pub(super) fn new_header(&self) -> Result<[u8; HEADER_LEN]> {
        let mut header = [0u8; HEADER_LEN];
        self.rng
            .fill(&mut header)
            .map_err(|_| VaultError::Crypto("system RNG unavailable".to_string()))?;
        Ok(header)
    }

    fn nonce(header: &[u8; HEADER_LEN], counter: u32) -> Nonce {
        let mut bytes = [0u8; NONCE_LEN];
        bytes[..HEADER_LEN].copy_from_slice(header);
        bytes[HEADER_LEN..].copy_from_slice(&counter.to_be_bytes());
        Nonce::assume_unique_for_key(bytes)
    }

    fn aad(last: bool) -> Aad<[u8; 1]> {
        Aad::from(if last { FINAL_CHUNK } else { INNER_CHUNK })
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Sealing
// =============================================================================

/// Splits plaintext into sealed chunks, one at a time
pub(super) struct Sealer<'a> {
    cipher: &'a Cipher,
    header: [u8; HEADER_LEN],
    plaintext: &'a [u8],
    offset: usize,
    counter: u32,
    done: bool,
    scratch: Vec<u8>,
}

impl<'a> Sealer<'a> {
    pub(super) fn new(cipher: &'a Cipher, plaintext: &'a [u8]) -> Result<Self> {
        Ok(Self {
            cipher,
            header: cipher.new_header()?,
            plaintext,
            offset: 0,
            counter: 0,
            done: false,
            scratch: Vec::with_capacity(CHUNK_LEN.min(plaintext.len()) + TAG_LEN),
        })
    }

    pub(super) fn header(&self) -> &[u8] {
        &self.header
    }

    /// Next sealed chunk, or None once the final chunk has been produced
    pub(super) fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        if self.done {
            return Ok(None);
        }

        let end = (self.offset + CHUNK_LEN).min(self.plaintext.len());
        let last = end == self.plaintext.len();

        self.scratch.clear();
        self.scratch.extend_from_slice(&self.plaintext[self.offset..end]);
        self.cipher
            .key
            .seal_in_place_append_tag(
                Cipher::nonce(&self.header, self.counter),
                Cipher::aad(last),
                &mut self.scratch,
            )
            .map_err(|_| VaultError::Crypto(format!("failed to seal chunk {}", self.counter)))?;

        self.offset = end;
        if last {
            self.done = true;
        } else {
            self.counter = self
                .counter
                .checked_add(1)
                .ok_or_else(|| VaultError::Crypto("stream exceeds chunk counter".to_string()))?;
        }

        Ok(Some(&self.scratch))
    }
}

// =============================================================================
// Opening
// =============================================================================

/// Opens sealed chunks in order, in place
pub(super) struct Opener<'a> {
    cipher: &'a Cipher,
    header: [u8; HEADER_LEN],
    counter: u32,
}

impl<'a> Opener<'a> {
    pub(super) fn new(cipher: &'a Cipher, header: [u8; HEADER_LEN]) -> Self {
        Self {
            cipher,
            header,
            counter: 0,
        }
    }

    /// Decrypt `sealed` in place; the plaintext is its prefix.
    /// Returns the plaintext length.
    pub(super) fn open(&mut self, sealed: &mut [u8], last: bool) -> Result<usize> {
        if sealed.len() < TAG_LEN {
            return Err(VaultError::DecryptionFailed(format!(
                "chunk {} truncated to {} bytes",
                self.counter,
                sealed.len()
            )));
        }

        let plaintext = self
            .cipher
            .key
            .open_in_place(
                Cipher::nonce(&self.header, self.counter),
                Cipher::aad(last),
                sealed,
            )
            .map_err(|_| {
                VaultError::DecryptionFailed(format!(
                    "chunk {} failed authentication (wrong key, tampered or truncated data)",
                    self.counter
                ))
            })?;
        let len = plaintext.len();

        if !last {
            self.counter = self.counter.checked_add(1).ok_or_else(|| {
                VaultError::DecryptionFailed("stream exceeds chunk counter".to_string())
            })?;
        }

        Ok(len)
    }
}
