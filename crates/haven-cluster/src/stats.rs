//! Engine counters.

/// Statistics about replication and maintenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// Writes acknowledged with a full quorum
    pub writes: u64,
    /// Writes rejected for lack of peers or replicas
    pub failed_writes: u64,
    /// Replicas pushed to remote peers
    pub replicas_pushed: u64,
    /// Pushes to remote peers that failed
    pub push_failures: u64,
    /// Objects fetched by anti-entropy
    pub objects_fetched: u64,
    /// Fetch attempts that failed
    pub fetch_failures: u64,
    /// Local copies removed by garbage collection
    pub objects_purged: u64,
    /// Heartbeats published
    pub heartbeats: u64,
}
