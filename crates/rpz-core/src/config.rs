//! Configuration types for the RPZ loader
//!
//! This module defines the on-disk configuration format (YAML) and turns a
//! validated configuration into the [`ZoneSpec`] list consumed by the
//! orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::zone::{ReloadSchedule, Rule, SoaParams, ZoneKind, ZoneSpec, validate_domain_name};

/// Main loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpzConfig {
    /// Directory the generated zone files are written to
    pub data_dir: PathBuf,

    /// Primary nameserver used in the SOA MNAME and NS records
    pub nameserver: String,

    /// Hostmaster email used in the SOA RNAME
    pub hostmaster_email: String,

    /// Build zone files but never contact the nameserver
    #[serde(default)]
    pub dry_run: bool,

    /// Hosts set as ALSO-NOTIFY metadata after every load
    #[serde(default)]
    pub also_notify: Vec<String>,

    /// Send an explicit NOTIFY after every load
    #[serde(default)]
    pub notify: bool,

    /// Path or name of the `pdnsutil` binary
    #[serde(default = "default_pdnsutil_path")]
    pub pdnsutil_path: String,

    /// Path or name of the `pdns_control` binary
    #[serde(default = "default_pdns_control_path")]
    pub pdns_control_path: String,

    /// Scheduling and timeout settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Zones to manage
    #[serde(default)]
    pub rpzs: Vec<ZoneConfig>,
}

impl RpzConfig {
    /// Parse a configuration from YAML text
    ///
    /// The result is not validated; call [`RpzConfig::validate`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::config("data_dir is required"));
        }

        if self.nameserver.trim().is_empty() {
            return Err(Error::config("nameserver is required"));
        }

        if self.hostmaster_email.trim().is_empty() {
            return Err(Error::config("hostmaster_email is required"));
        }

        if self.rpzs.is_empty() {
            return Err(Error::config("rpzs is required"));
        }

        for host in &self.also_notify {
            if host.trim().is_empty() {
                return Err(Error::config("also_notify entries cannot be empty"));
            }
        }

        self.scheduler.validate()?;

        let mut names = HashSet::new();
        for zone in &self.rpzs {
            zone.validate()?;

            // `rpz` and `rpz.` are the same zone and the same file
            if !names.insert(zone.name.trim_end_matches('.')) {
                return Err(Error::config(format!("rpz '{}' is defined twice", zone.name)));
            }
        }

        Ok(())
    }

    /// Validate and build the immutable zone list
    pub fn zone_specs(&self) -> Result<Vec<ZoneSpec>> {
        self.validate()?;
        self.rpzs.iter().map(|zone| zone.to_spec(self)).collect()
    }
}

/// Zone type as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    /// Rules listed in the configuration
    Static,
    /// Rules mirrored from a remote feed
    Managed,
}

/// One zone entry of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone name
    pub name: String,

    /// Zone type
    #[serde(rename = "type")]
    pub zone_type: ZoneType,

    /// Cron expression (managed zones)
    #[serde(default)]
    pub reload_schedule: Option<String>,

    /// Feed URL (managed zones)
    #[serde(default)]
    pub url: Option<String>,

    /// Sync once shortly after startup (managed zones)
    #[serde(default)]
    pub fetch_on_start: bool,

    /// Policy rules (static zones)
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default = "default_ttl")]
    pub ttl: u32,

    #[serde(default = "default_refresh")]
    pub refresh: u32,

    #[serde(default = "default_retry")]
    pub retry: u32,

    #[serde(default = "default_expire")]
    pub expire: u32,

    #[serde(default = "default_negative_ttl")]
    pub negative_ttl: u32,
}

impl ZoneConfig {
    /// Validate a single zone entry
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("rpz name is required"));
        }

        validate_domain_name(self.name.trim_end_matches('.'))
            .map_err(|e| Error::config(format!("rpz name '{}' is invalid: {}", self.name, e)))?;

        for (field, value) in [
            ("ttl", self.ttl),
            ("refresh", self.refresh),
            ("retry", self.retry),
            ("expire", self.expire),
            ("negative_ttl", self.negative_ttl),
        ] {
            if value == 0 {
                return Err(Error::config(format!(
                    "rpz '{}': {} must be greater than zero",
                    self.name, field
                )));
            }
        }

        match self.zone_type {
            ZoneType::Static => {
                if self.rules.is_empty() {
                    return Err(Error::config(format!(
                        "rpz '{}': rules is required for static zones",
                        self.name
                    )));
                }
                for rule in &self.rules {
                    rule.validate()?;
                }
            }
            ZoneType::Managed => {
                let url = self.url.as_deref().unwrap_or_default().trim();
                if url.is_empty() {
                    return Err(Error::config(format!(
                        "rpz '{}': url is required for managed zones",
                        self.name
                    )));
                }
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(Error::config(format!(
                        "rpz '{}': url must use http or https. Got: {}",
                        self.name, url
                    )));
                }

                let schedule = self.reload_schedule.as_deref().unwrap_or_default();
                if schedule.trim().is_empty() {
                    return Err(Error::config(format!(
                        "rpz '{}': reload_schedule is required for managed zones",
                        self.name
                    )));
                }
                ReloadSchedule::parse(schedule)?;
            }
        }

        Ok(())
    }

    /// Build the spec for this zone using the global settings in `config`
    fn to_spec(&self, config: &RpzConfig) -> Result<ZoneSpec> {
        let name = self.name.trim_end_matches('.').to_string();

        let kind = match self.zone_type {
            ZoneType::Static => ZoneKind::Static {
                rules: self.rules.clone(),
            },
            ZoneType::Managed => ZoneKind::Remote {
                url: self.url.clone().unwrap_or_default().trim().to_string(),
                schedule: ReloadSchedule::parse(
                    self.reload_schedule.as_deref().unwrap_or_default(),
                )?,
                fetch_on_start: self.fetch_on_start,
            },
        };

        Ok(ZoneSpec {
            file_path: zone_file_path(&config.data_dir, &name),
            name,
            ttl: self.ttl,
            soa: SoaParams {
                nameserver: config.nameserver.clone(),
                hostmaster_email: config.hostmaster_email.clone(),
                refresh: self.refresh,
                retry: self.retry,
                expire: self.expire,
                negative_ttl: self.negative_ttl,
            },
            kind,
        })
    }
}

/// Location of a zone's generated file
pub fn zone_file_path(data_dir: &Path, zone_name: &str) -> PathBuf {
    data_dir.join(format!("{zone_name}.zone"))
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay before one-shot startup jobs fire (in seconds)
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    /// How long shutdown waits for the in-flight job (in seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Hard timeout for each nameserver control command (in seconds)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Timeout for remote feed downloads (in seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Capacity of the orchestrator event channel
    ///
    /// When full, events are dropped with a warning; job execution is never
    /// blocked by a slow event consumer.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SchedulerConfig {
    /// Validate the scheduler configuration
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(Error::config("scheduler.command_timeout_secs must be > 0"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(Error::config("scheduler.fetch_timeout_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("scheduler.event_channel_capacity must be > 0"));
        }
        Ok(())
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            startup_delay_secs: default_startup_delay_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_pdnsutil_path() -> String {
    "pdnsutil".to_string()
}

fn default_pdns_control_path() -> String {
    "pdns_control".to_string()
}

fn default_ttl() -> u32 {
    30
}

fn default_refresh() -> u32 {
    3600
}

fn default_retry() -> u32 {
    600
}

fn default_expire() -> u32 {
    604800
}

fn default_negative_ttl() -> u32 {
    30
}

fn default_startup_delay_secs() -> u64 {
    10
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    256
}
