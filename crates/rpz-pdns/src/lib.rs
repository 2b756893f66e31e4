// # PowerDNS Zone Server
//
// This crate drives a local PowerDNS Authoritative server through its
// command-line tools.
//
// ## Commands
//
// | Operation        | Invocation                                               |
// |------------------|----------------------------------------------------------|
// | load a zone      | `pdnsutil zone load <zone> <file>`                       |
// | set ALSO-NOTIFY  | `pdnsutil metadata set <zone> ALSO-NOTIFY <host>...`     |
// | send NOTIFY      | `pdns_control notify <zone>`                             |
//
// ## Constraints
//
// - One process per call, bounded by the command timeout
// - No retries: a failed call is reported to the sync task as-is
// - Program paths are configurable for non-standard installs and tests

pub mod command;

use async_trait::async_trait;
use rpz_core::ServerSyncError;
use rpz_core::traits::ZoneServer;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use command::{CommandOutput, CommandRunner, DEFAULT_COMMAND_TIMEOUT};

/// Default `pdnsutil` program
pub const DEFAULT_PDNSUTIL: &str = "pdnsutil";

/// Default `pdns_control` program
pub const DEFAULT_PDNS_CONTROL: &str = "pdns_control";

/// PowerDNS Authoritative control client
#[derive(Debug, Clone)]
pub struct PowerDns {
    /// Path or name of `pdnsutil`
    pdnsutil: PathBuf,

    /// Path or name of `pdns_control`
    pdns_control: PathBuf,

    /// Execution primitive shared by all calls
    runner: CommandRunner,
}

impl PowerDns {
    /// Create a client using the given programs and per-command timeout
    pub fn new(
        pdnsutil: impl Into<PathBuf>,
        pdns_control: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            pdnsutil: pdnsutil.into(),
            pdns_control: pdns_control.into(),
            runner: CommandRunner::new(timeout),
        }
    }

    /// `pdnsutil` program in use
    pub fn pdnsutil(&self) -> &Path {
        &self.pdnsutil
    }

    /// `pdns_control` program in use
    pub fn pdns_control(&self) -> &Path {
        &self.pdns_control
    }

    /// Per-command timeout
    pub fn timeout(&self) -> Duration {
        self.runner.timeout()
    }
}

impl Default for PowerDns {
    fn default() -> Self {
        Self::new(DEFAULT_PDNSUTIL, DEFAULT_PDNS_CONTROL, DEFAULT_COMMAND_TIMEOUT)
    }
}

/// Arguments for `pdnsutil zone load`
pub fn zone_load_args(zone_name: &str, zone_file: &Path) -> Vec<String> {
    vec![
        "zone".to_string(),
        "load".to_string(),
        zone_name.to_string(),
        zone_file.display().to_string(),
    ]
}

/// Arguments for `pdnsutil metadata set ... ALSO-NOTIFY`
pub fn also_notify_args(zone_name: &str, hosts: &[String]) -> Vec<String> {
    let mut args = vec![
        "metadata".to_string(),
        "set".to_string(),
        zone_name.to_string(),
        "ALSO-NOTIFY".to_string(),
    ];
    args.extend(hosts.iter().cloned());
    args
}

/// Arguments for `pdns_control notify`
pub fn notify_args(zone_name: &str) -> Vec<String> {
    vec!["notify".to_string(), zone_name.to_string()]
}

fn require_zone_name(program: &Path, zone_name: &str) -> Result<(), ServerSyncError> {
    if zone_name.trim().is_empty() {
        return Err(ServerSyncError::execution(
            program.display().to_string(),
            "zone name is required",
        ));
    }
    Ok(())
}

#[async_trait]
impl ZoneServer for PowerDns {
    async fn load_zone(&self, zone_name: &str, zone_file: &Path) -> Result<(), ServerSyncError> {
        require_zone_name(&self.pdnsutil, zone_name)?;
        if zone_file.as_os_str().is_empty() {
            return Err(ServerSyncError::execution(
                self.pdnsutil.display().to_string(),
                "zone file is required",
            ));
        }

        self.runner
            .run(&self.pdnsutil, &zone_load_args(zone_name, zone_file))
            .await?;
        Ok(())
    }

    async fn set_also_notify(
        &self,
        zone_name: &str,
        hosts: &[String],
    ) -> Result<(), ServerSyncError> {
        require_zone_name(&self.pdnsutil, zone_name)?;
        self.runner
            .run(&self.pdnsutil, &also_notify_args(zone_name, hosts))
            .await?;
        Ok(())
    }

    async fn notify_zone(&self, zone_name: &str) -> Result<(), ServerSyncError> {
        require_zone_name(&self.pdns_control, zone_name)?;
        self.runner
            .run(&self.pdns_control, &notify_args(zone_name))
            .await?;
        Ok(())
    }

    fn server_name(&self) -> &'static str {
        "powerdns"
    }
}
