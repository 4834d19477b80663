//! Mapping decoder

use bytes::{Buf, Bytes};

use crate::error::{Result, VaultError};
use crate::mapping::{KeyComparison, Mapping};

use super::{CRC_SIZE, ENTRY_HEADER_SIZE, MIN_ENCODED_SIZE};

/// Decode bytes produced by [`encode`](super::encode)
///
/// Empty input yields an empty mapping. Values are copied out of `bytes`, so
/// the input may live in a rented buffer.
pub fn decode(bytes: &[u8], comparison: KeyComparison) -> Result<Mapping> {
    if bytes.is_empty() {
        return Ok(Mapping::new(comparison));
    }

    if bytes.len() < MIN_ENCODED_SIZE {
        return Err(VaultError::CorruptData(format!(
            "Input too short: expected at least {} bytes, got {}",
            MIN_ENCODED_SIZE,
            bytes.len()
        )));
    }

    // Verify checksum before trusting any length field
    let (body, crc_bytes) = bytes.split_at(bytes.len() - CRC_SIZE);
    let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let actual_crc = crc32fast::hash(body);
    if stored_crc != actual_crc {
        return Err(VaultError::CorruptData(format!(
            "Checksum mismatch: stored 0x{:08x}, computed 0x{:08x}",
            stored_crc, actual_crc
        )));
    }

    let mut cursor = body;
    let count = cursor.get_u32_le() as usize;

    // Never trust `count` for allocation beyond what the input could hold
    let max_possible = cursor.remaining() / ENTRY_HEADER_SIZE;
    let mut mapping = Mapping::with_capacity(comparison, count.min(max_possible));

    for index in 0..count {
        if cursor.remaining() < ENTRY_HEADER_SIZE {
            return Err(VaultError::CorruptData(format!(
                "Entry {}: missing header ({} bytes left)",
                index,
                cursor.remaining()
            )));
        }

        let key_len = cursor.get_u32_le() as usize;
        let val_len = cursor.get_u32_le() as usize;

        if cursor.remaining() < key_len.saturating_add(val_len) {
            return Err(VaultError::CorruptData(format!(
                "Entry {}: lengths {}+{} overrun input ({} bytes left)",
                index,
                key_len,
                val_len,
                cursor.remaining()
            )));
        }

        let key = std::str::from_utf8(&cursor[..key_len])
            .map_err(|e| VaultError::CorruptData(format!("Entry {}: key is not UTF-8: {}", index, e)))?
            .to_owned();
        cursor.advance(key_len);

        let value = Bytes::copy_from_slice(&cursor[..val_len]);
        cursor.advance(val_len);

        if !mapping.try_insert(key, value) {
            return Err(VaultError::CorruptData(format!(
                "Entry {}: duplicate key under {:?} comparison",
                index, comparison
            )));
        }
    }

    if cursor.has_remaining() {
        return Err(VaultError::CorruptData(format!(
            "{} trailing bytes after {} entries",
            cursor.remaining(),
            count
        )));
    }

    Ok(mapping)
}
