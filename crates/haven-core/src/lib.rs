//! Haven Core - shared types for the Haven replicated object store.
//!
//! This crate provides:
//! - Content addresses (`BlobHash`) and the streaming digest behind them
//! - Object metadata (`Envelope`) and peer descriptors (`Peer`, `PeerId`)
//! - Timestamps and injectable clocks
//! - The `BlobStore` contract shared by local stores, peer handles and the
//!   cluster engine

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod envelope;
pub mod error;
pub mod hash;
pub mod peer;
pub mod store;
pub mod time;

pub use envelope::Envelope;
pub use error::BlobError;
pub use hash::{BlobHash, BlobHasher};
pub use peer::{Peer, PeerId};
pub use store::{read_all, BlobRead, BlobReader, BlobStore};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};

/// Length of a content address in bytes (half of a SHA-512 digest).
pub const HASH_SIZE: usize = 32;

/// Length of a content address rendered as lowercase hex.
pub const HASH_HEX_LEN: usize = HASH_SIZE * 2;
