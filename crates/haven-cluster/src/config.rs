//! Cluster engine configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use haven_core::{BlobError, BlobStore, Clock, PeerId, SystemClock};

use crate::client::PeerClientFactory;
use crate::directory::PeerDirectory;
use crate::{
    DEFAULT_FETCH_PERIOD_SECS, DEFAULT_GRACE_PERIOD_SECS, DEFAULT_HEARTBEAT_PERIOD_SECS,
    DEFAULT_MISSED_HEARTBEATS, DEFAULT_PEER_TIMEOUT_SECS, DEFAULT_PURGE_PERIOD_SECS,
    DEFAULT_WRITE_FACTOR,
};

/// Everything the cluster engine is built from.
#[derive(Clone)]
pub struct ClusterConfig {
    /// This peer's identifier
    pub peer_id: PeerId,
    /// Address other peers use to reach this one
    pub advertise_addr: String,
    /// This peer's local object store
    pub local: Arc<dyn BlobStore>,
    /// Cluster-wide peer and registration bookkeeping
    pub directory: Arc<dyn PeerDirectory>,
    /// Resolves peers to handles on their object stores
    pub client_factory: PeerClientFactory,
    /// Minimum number of replicas before a write is acknowledged
    pub write_factor: usize,
    /// Interval between heartbeats
    pub heartbeat_period: Duration,
    /// Heartbeats a peer may miss before it is excluded from fan-out
    pub missed_heartbeats: u32,
    /// Minimum age of an unregistered local object before it is purged
    pub grace_period: Duration,
    /// Interval between anti-entropy passes
    pub fetch_period: Duration,
    /// Interval between garbage collection passes
    pub purge_period: Duration,
    /// Bound on each call to a remote peer
    pub peer_timeout: Duration,
    /// Expiry attached to object registrations; `None` keeps them forever
    pub registration_ttl: Option<Duration>,
    /// Time source for heartbeats, liveness and object age
    pub clock: Arc<dyn Clock>,
}

impl ClusterConfig {
    /// Creates a configuration with default tunables.
    pub fn new(
        peer_id: impl Into<PeerId>,
        advertise_addr: impl Into<String>,
        local: Arc<dyn BlobStore>,
        directory: Arc<dyn PeerDirectory>,
        client_factory: PeerClientFactory,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            advertise_addr: advertise_addr.into(),
            local,
            directory,
            client_factory,
            write_factor: DEFAULT_WRITE_FACTOR,
            heartbeat_period: Duration::from_secs(DEFAULT_HEARTBEAT_PERIOD_SECS),
            missed_heartbeats: DEFAULT_MISSED_HEARTBEATS,
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
            fetch_period: Duration::from_secs(DEFAULT_FETCH_PERIOD_SECS),
            purge_period: Duration::from_secs(DEFAULT_PURGE_PERIOD_SECS),
            peer_timeout: Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS),
            registration_ttl: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Fills unset optional values with defaults and rejects missing
    /// required ones.
    pub fn validate(&mut self) -> Result<(), BlobError> {
        if self.peer_id.is_empty() {
            return Err(BlobError::Config("peer ID is required".to_string()));
        }
        if self.advertise_addr.is_empty() {
            return Err(BlobError::Config("advertise address is required".to_string()));
        }
        if self.heartbeat_period.is_zero() {
            return Err(BlobError::Config("heartbeat period is required".to_string()));
        }
        if self.missed_heartbeats == 0 {
            return Err(BlobError::Config("missed heartbeats must be at least 1".to_string()));
        }
        if self.heartbeat_period.checked_mul(self.missed_heartbeats).is_none() {
            return Err(BlobError::Config(
                "heartbeat period times missed heartbeats overflows".to_string(),
            ));
        }
        if self.fetch_period.is_zero() || self.purge_period.is_zero() {
            return Err(BlobError::Config("task periods must be non-zero".to_string()));
        }
        if self.peer_timeout.is_zero() {
            return Err(BlobError::Config("peer timeout must be non-zero".to_string()));
        }

        if self.write_factor == 0 {
            self.write_factor = DEFAULT_WRITE_FACTOR;
        }
        if self.grace_period.is_zero() {
            self.grace_period = Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS);
        }
        Ok(())
    }

    /// Returns how long a peer stays live after its last heartbeat.
    /// Saturates for configurations that have not been validated.
    pub fn liveness_window(&self) -> Duration {
        self.heartbeat_period
            .checked_mul(self.missed_heartbeats)
            .unwrap_or(Duration::MAX)
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("peer_id", &self.peer_id)
            .field("advertise_addr", &self.advertise_addr)
            .field("write_factor", &self.write_factor)
            .field("heartbeat_period", &self.heartbeat_period)
            .field("missed_heartbeats", &self.missed_heartbeats)
            .field("grace_period", &self.grace_period)
            .field("fetch_period", &self.fetch_period)
            .field("purge_period", &self.purge_period)
            .field("peer_timeout", &self.peer_timeout)
            .field("registration_ttl", &self.registration_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StaticClients;
    use crate::directory::MemoryDirectory;
    use crate::testing::MemoryBlobs;

    fn config() -> ClusterConfig {
        ClusterConfig::new(
            "node-0",
            "127.0.0.1:7000",
            Arc::new(MemoryBlobs::new()),
            Arc::new(MemoryDirectory::new()),
            StaticClients::new().factory(),
        )
    }

    #[test]
    fn test_defaults() {
        let mut config = config();
        config.validate().unwrap();

        assert_eq!(config.write_factor, DEFAULT_WRITE_FACTOR);
        assert_eq!(config.liveness_window(), Duration::from_secs(30));
        assert!(config.registration_ttl.is_none());
    }

    #[test]
    fn test_unset_values_get_defaults() {
        let mut config = config();
        config.write_factor = 0;
        config.grace_period = Duration::ZERO;
        config.validate().unwrap();

        assert_eq!(config.write_factor, 1);
        assert_eq!(config.grace_period, Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS));
    }

    #[test]
    fn test_missing_required_values() {
        let mut missing_id = config();
        missing_id.peer_id = PeerId::new("");
        assert!(matches!(missing_id.validate(), Err(BlobError::Config(_))));

        let mut missing_addr = config();
        missing_addr.advertise_addr.clear();
        assert!(matches!(missing_addr.validate(), Err(BlobError::Config(_))));

        let mut no_heartbeat = config();
        no_heartbeat.heartbeat_period = Duration::ZERO;
        assert!(matches!(no_heartbeat.validate(), Err(BlobError::Config(_))));

        let mut no_misses = config();
        no_misses.missed_heartbeats = 0;
        assert!(matches!(no_misses.validate(), Err(BlobError::Config(_))));
    }

    #[test]
    fn test_liveness_window_overflow_rejected() {
        let mut config = config();
        config.heartbeat_period = Duration::from_secs(u64::MAX / 2);
        assert!(matches!(config.validate(), Err(BlobError::Config(_))));
        assert_eq!(config.liveness_window(), Duration::MAX);

        config.missed_heartbeats = 1;
        config.validate().unwrap();
        assert_eq!(config.liveness_window(), Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn test_debug_omits_handles() {
        let rendered = format!("{:?}", config());
        assert!(rendered.contains("node-0"));
        assert!(!rendered.contains("client_factory"));
    }
}
