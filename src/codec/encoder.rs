//! Mapping encoder

use crate::buffer::{BufferPool, RentedBuffer};
use crate::error::{Result, VaultError};
use crate::mapping::Mapping;

use super::{COUNT_SIZE, CRC_SIZE, ENTRY_HEADER_SIZE};

/// Exact size of `encode(mapping)`
pub fn encoded_len(mapping: &Mapping) -> usize {
    let entries: usize = mapping
        .iter()
        .map(|(key, value)| ENTRY_HEADER_SIZE + key.len() + value.len())
        .sum();
    COUNT_SIZE + entries + CRC_SIZE
}

/// Encode into a rented buffer (appends after any written data)
///
/// The CRC covers only the bytes written by this call. Fails with
/// `Serialization` if a count or length does not fit its u32 field; `out`
/// may then hold a partial encoding.
pub fn encode_into(mapping: &Mapping, out: &mut RentedBuffer<'_>) -> Result<()> {
    let start = out.len();
    let mut hasher = crc32fast::Hasher::new();

    let count = field(mapping.len(), "entry count")?.to_le_bytes();
    out.extend_from_slice(&count);
    hasher.update(&count);

    for (key, value) in mapping.iter() {
        let key_len = field(key.len(), "key length")?.to_le_bytes();
        let val_len = field(value.len(), "value length")?.to_le_bytes();

        out.extend_from_slice(&key_len);
        out.extend_from_slice(&val_len);
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(value);

        hasher.update(&key_len);
        hasher.update(&val_len);
        hasher.update(key.as_bytes());
        hasher.update(value);
    }

    out.extend_from_slice(&hasher.finalize().to_le_bytes());
    debug_assert_eq!(out.len() - start, encoded_len(mapping));
    Ok(())
}

/// Encode to an owned vector
pub fn encode(mapping: &Mapping) -> Result<Vec<u8>> {
    let mut buffer = BufferPool::shared().rent(encoded_len(mapping));
    encode_into(mapping, &mut buffer)?;
    Ok(buffer.written().to_vec())
}

/// A count or length as its on-disk u32
fn field(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        VaultError::Serialization(format!(
            "{} {} exceeds the format limit of {}",
            what,
            len,
            u32::MAX
        ))
    })
}
