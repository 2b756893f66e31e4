// # Zone Server Trait
//
// Defines the interface to the running authoritative nameserver.
//
// ## Implementations
//
// - PowerDNS: `rpz-pdns` crate (`pdnsutil` / `pdns_control`)

use async_trait::async_trait;
use std::path::Path;

use crate::error::ServerSyncError;

/// Trait for authoritative server control
///
/// Implementations apply one generated zone file to the server. Each call is
/// a single bounded invocation; timeouts are enforced by the implementation
/// and reported as [`ServerSyncError::Timeout`].
///
/// # Concurrency
///
/// The orchestrator never runs two sync tasks at once, so implementations
/// can assume they are the only caller touching the server.
#[async_trait]
pub trait ZoneServer: Send + Sync {
    /// Replace the zone's contents with the given zone file
    async fn load_zone(&self, zone_name: &str, zone_file: &Path) -> Result<(), ServerSyncError>;

    /// Set the zone's ALSO-NOTIFY metadata to `hosts`
    async fn set_also_notify(&self, zone_name: &str, hosts: &[String])
        -> Result<(), ServerSyncError>;

    /// Send a NOTIFY for the zone to its secondaries
    async fn notify_zone(&self, zone_name: &str) -> Result<(), ServerSyncError>;

    /// Get the server name (for logging/debugging)
    fn server_name(&self) -> &'static str;
}
