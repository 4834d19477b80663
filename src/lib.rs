//! # VaultKV
//!
//! A lightweight, file-backed key-value store with:
//! - In-memory reads that never wait on disk
//! - Coalesced, single-flight flushes (a burst of writes costs one write)
//! - Atomic temp-file-then-rename replacement of the backing file
//! - Optional AES-256-GCM encryption and case-insensitive keys
//! - Blocking and async (cancellable) I/O paths
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │        (RwLock mapping + generation, flush gate)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ snapshot
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Serializer                            │
//! │     Plain / IgnoreCase / Encrypted / EncryptedIgnoreCase     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Codec    │          │   Crypto    │
//!   │ (CRC frame) │          │ (AES-GCM)   │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │ Buffer Pool │
//!   │  (rented)   │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod buffer;
pub mod mapping;
pub mod codec;
pub mod crypto;
pub mod serializer;
pub mod cancel;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, VaultError};
pub use config::Config;
pub use cancel::CancellationToken;
pub use engine::Engine;
pub use mapping::{KeyComparison, Mapping};
pub use serializer::{Serializer, SerializerKind};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of VaultKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
