//! Codec Module
//!
//! Converts a [`Mapping`](crate::mapping::Mapping) to and from bytes.
//!
//! ## Format (little-endian)
//! ```text
//! ┌──────────────┬──────────────────────────────────────────┬────────────┐
//! │ Count (4)    │ Entries                                  │ CRC32 (4)  │
//! └──────────────┴──────────────────────────────────────────┴────────────┘
//!
//! Entry:
//! ┌──────────────┬──────────────┬────────────────┬───────────────┐
//! │ KeyLen (4)   │ ValLen (4)   │ Key (UTF-8)    │ Value         │
//! └──────────────┴──────────────┴────────────────┴───────────────┘
//! ```
//!
//! The CRC covers every byte before it. Entry order is unspecified.
//! A zero-length input is an empty mapping; anything else that does not
//! parse exactly is `CorruptData`.

mod decoder;
mod encoder;

pub use decoder::decode;
pub use encoder::{encode, encode_into, encoded_len};

/// Entry count prefix
pub const COUNT_SIZE: usize = 4;

/// Per-entry header: key length (4) + value length (4)
pub const ENTRY_HEADER_SIZE: usize = 8;

/// Trailing checksum
pub const CRC_SIZE: usize = 4;

/// Smallest non-empty encoding (an empty mapping)
pub const MIN_ENCODED_SIZE: usize = COUNT_SIZE + CRC_SIZE;
