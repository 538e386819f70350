//! Haven Cluster - replicated object storage.
//!
//! Composes a local store, a peer directory and a peer client factory into
//! a cluster-wide `BlobStore`:
//! - Writes land locally first and are pushed to live peers one at a time
//!   until the write factor is reached
//! - Reads try live holders in a fixed order, local peer first
//! - Background tasks publish heartbeats, fetch objects this peer is
//!   missing and purge local copies of deleted objects after a grace period

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod directory;
pub mod engine;
pub mod peers;
pub mod stats;
mod tasks;

#[cfg(test)]
mod testing;

pub use client::{PeerClientFactory, StaticClients};
pub use config::ClusterConfig;
pub use directory::{MemoryDirectory, PeerDirectory, Registration};
pub use engine::Cluster;
pub use peers::{matches_peer, sort_peers};
pub use stats::ClusterStats;

/// Default minimum number of replicas per write.
pub const DEFAULT_WRITE_FACTOR: usize = 1;

/// Default interval between heartbeats in seconds.
pub const DEFAULT_HEARTBEAT_PERIOD_SECS: u64 = 10;

/// Default number of heartbeats a peer may miss before it is treated as down.
pub const DEFAULT_MISSED_HEARTBEATS: u32 = 3;

/// Default minimum age in seconds before an unregistered local object is purged (1 hour).
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 3600;

/// Default interval between anti-entropy passes in seconds.
pub const DEFAULT_FETCH_PERIOD_SECS: u64 = 30;

/// Default interval between garbage collection passes in seconds.
pub const DEFAULT_PURGE_PERIOD_SECS: u64 = 300;

/// Default bound on a single call to a remote peer in seconds.
pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 30;
