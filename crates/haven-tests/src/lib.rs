//! Integration tests for Haven.
//!
//! This crate provides:
//! - A multi-node cluster harness sharing one in-process peer directory
//! - Integration tests for the local store, quorum writes, anti-entropy
//!   and garbage collection

pub mod harness;
pub mod node;

pub use harness::TestCluster;
pub use node::{TestNode, TestNodeConfig};

/// Returns `len` bytes of random content.
pub fn random_content(len: usize) -> Vec<u8> {
    use rand::RngCore;

    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}
