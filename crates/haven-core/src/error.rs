//! Error taxonomy shared by every `BlobStore` implementation.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::peer::PeerId;

/// Errors from object-store operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Object, registration or peer does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// String is not a well-formed content address
    #[error("Invalid hash: {0:?}")]
    InvalidHash(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Missing or invalid construction parameter
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fewer peers are available than the write factor requires
    #[error("Not enough peers: need {target}, have {achieved}")]
    NotEnoughPeers {
        /// Replicas required
        target: usize,
        /// Replicas available or achieved
        achieved: usize,
    },

    /// Replication ran out of peers before reaching the write factor
    #[error(
        "Replicated to {achieved} of {target} peers: {}",
        join_errors(.errors)
    )]
    Replication {
        /// Replicas required
        target: usize,
        /// Replicas achieved
        achieved: usize,
        /// Per-peer failures
        errors: Vec<BlobError>,
    },

    /// Several independent operations failed
    #[error("{} operations failed: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<BlobError>),

    /// Peer directory failure
    #[error("Peer directory error: {0}")]
    Directory(String),

    /// A remote peer rejected or failed a call
    #[error("Peer {peer}: {message}")]
    Peer {
        /// Peer that failed
        peer: PeerId,
        /// Failure description
        message: String,
    },

    /// A call to a remote peer did not complete in time
    #[error("Peer {peer} timed out after {timeout:?}")]
    Timeout {
        /// Peer that timed out
        peer: PeerId,
        /// Configured per-call bound
        timeout: Duration,
    },
}

impl BlobError {
    /// Translates an IO error about `what`, mapping "no such file" to
    /// [`BlobError::NotFound`].
    pub fn from_io(err: io::Error, what: impl std::fmt::Display) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            BlobError::NotFound(what.to_string())
        } else {
            BlobError::Io(err)
        }
    }

    /// Returns true if the error means "does not exist".
    pub fn is_not_found(&self) -> bool {
        match self {
            BlobError::NotFound(_) => true,
            BlobError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns true for quorum and connectivity failures.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            BlobError::NotEnoughPeers { .. } | BlobError::Replication { .. }
        )
    }

    /// Folds a list of failures into a single result.
    pub fn aggregate(mut errors: Vec<BlobError>) -> Result<(), BlobError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(BlobError::Aggregate(errors)),
        }
    }
}

fn join_errors(errors: &[BlobError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
