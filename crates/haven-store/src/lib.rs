//! Haven Store - local content-addressed object storage.
//!
//! Objects are written to a scratch directory while their digest is
//! computed, then renamed into a content directory fanned out by the first
//! characters of the hash:
//!
//! ```text
//! <base>/tmp/                  in-flight writes
//! <base>/blobs/<abc>/<abc...>  stored objects
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod local;

pub use config::StoreConfig;
pub use local::LocalStore;

/// Number of leading hex characters used to pick an object's subdirectory
/// (up to 4096 subdirectories).
pub const FANOUT_PREFIX_LEN: usize = 3;

/// Size of the buffer used when streaming content to disk.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;
