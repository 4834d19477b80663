//! Buffer Module
//!
//! Pooled byte buffers for encode/decode.
//!
//! ## Responsibilities
//! - Hand out reusable byte arrays sized for a flush or load
//! - Grow a rental past its original size without losing written bytes
//! - Return arrays to the pool on every exit path (RAII)
//!
//! ## Size Classes
//! ```text
//! class:   0      1      2     ...   14
//! size:   4 KiB  8 KiB  16 KiB  ...  64 MiB
//! ```
//! Requests above the largest class bypass the pool entirely.

mod pool;
mod rented;

pub use pool::{BufferPool, PoolStats};
pub use rented::RentedBuffer;
