//! Zone definitions
//!
//! A [`ZoneSpec`] is the immutable, validated description of one managed
//! response policy zone. Specs are built once at startup from configuration
//! (see [`RpzConfig::zone_specs`](crate::config::RpzConfig::zone_specs)) and
//! shared read-only between the orchestrator and sync tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Policy action applied when a trigger matches
///
/// The RPZ convention encodes actions as CNAME targets; the literals
/// returned by [`Action::literal`] must be written verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Action {
    /// Answer NXDOMAIN (`.`)
    Nxdomain,
    /// Answer NODATA (`*.`)
    Nodata,
    /// Exempt from policy (`rpz-passthru.`)
    Passthru,
    /// Drop the query (`rpz-drop.`)
    Drop,
}

impl Action {
    /// The CNAME target encoding this action
    pub fn literal(self) -> &'static str {
        match self {
            Action::Nxdomain => ".",
            Action::Nodata => "*.",
            Action::Passthru => "rpz-passthru.",
            Action::Drop => "rpz-drop.",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

impl FromStr for Action {
    type Err = Error;

    /// Accepts either the RPZ literal or a descriptive name
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "." | "nxdomain" => Ok(Action::Nxdomain),
            "*." | "nodata" => Ok(Action::Nodata),
            "rpz-passthru." | "passthru" | "passthrough" => Ok(Action::Passthru),
            "rpz-drop." | "drop" => Ok(Action::Drop),
            other => Err(Error::config(format!(
                "Unknown RPZ action '{other}'. \
                Valid actions: nxdomain (.), nodata (*.), passthru (rpz-passthru.), drop (rpz-drop.)"
            ))),
        }
    }
}

impl TryFrom<String> for Action {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.literal().to_string()
    }
}

/// One policy entry of a static zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Domain the rule matches (relative to the zone origin)
    pub trigger: String,

    /// Response applied on match
    pub action: Action,

    /// Whether `*.<trigger>` is covered as well
    #[serde(default)]
    pub include_subdomains: bool,
}

impl Rule {
    /// Create a rule that does not cover subdomains
    pub fn new(trigger: impl Into<String>, action: Action) -> Self {
        Self {
            trigger: trigger.into(),
            action,
            include_subdomains: false,
        }
    }

    /// Also cover all subdomains of the trigger
    pub fn with_subdomains(mut self, include: bool) -> Self {
        self.include_subdomains = include;
        self
    }

    /// Check the trigger is a non-empty sequence of non-empty labels
    pub fn validate(&self) -> Result<()> {
        validate_domain_name(&self.trigger)
            .map_err(|e| Error::config(format!("Invalid rule trigger '{}': {}", self.trigger, e)))
    }
}

/// SOA timing and identity parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoaParams {
    /// Primary nameserver (MNAME)
    pub nameserver: String,
    /// Hostmaster email, converted to RNAME form when rendered
    pub hostmaster_email: String,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub negative_ttl: u32,
}

/// Kind-specific payload of a zone
#[derive(Debug, Clone)]
pub enum ZoneKind {
    /// Zone rendered from a fixed rule list
    Static {
        /// Rules in output order
        rules: Vec<Rule>,
    },

    /// Zone mirrored from a remote feed
    Remote {
        /// Feed URL
        url: String,
        /// Parsed reload schedule
        schedule: ReloadSchedule,
        /// Also sync once shortly after startup
        fetch_on_start: bool,
    },
}

/// Cron-style reload schedule
///
/// Five-field expressions (minute granularity) are accepted and treated as
/// firing at second zero; six and seven field expressions are used as-is.
#[derive(Debug, Clone)]
pub struct ReloadSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl ReloadSchedule {
    /// Parse a cron expression
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let normalized = match trimmed.split_whitespace().count() {
            5 => format!("0 {trimmed}"),
            _ => trimmed.to_string(),
        };

        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            Error::config(format!("Invalid reload schedule '{expression}': {e}"))
        })?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    /// The expression as configured
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next firing time strictly after `after`
    pub fn next_after<Tz: chrono::TimeZone>(
        &self,
        after: &chrono::DateTime<Tz>,
    ) -> Option<chrono::DateTime<Tz>> {
        self.schedule.after(after).next()
    }
}

/// Immutable definition of one managed zone
#[derive(Debug, Clone)]
pub struct ZoneSpec {
    /// Zone name (origin without trailing dot)
    pub name: String,

    /// Default TTL for the zone's records
    pub ttl: u32,

    /// SOA parameters
    pub soa: SoaParams,

    /// Where the generated zone file is written
    pub file_path: PathBuf,

    /// Static rules or remote feed
    pub kind: ZoneKind,
}

impl ZoneSpec {
    /// Whether this zone mirrors a remote feed
    pub fn is_remote(&self) -> bool {
        matches!(self.kind, ZoneKind::Remote { .. })
    }

    /// Kind label used in logs and metrics
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ZoneKind::Static { .. } => "static",
            ZoneKind::Remote { .. } => "managed",
        }
    }
}

/// Validate that a string is a relative domain name
///
/// Labels must be non-empty, at most 63 characters, and made of
/// alphanumerics, hyphens and underscores. A trailing dot is rejected since
/// rule triggers and zone names are always written relative to the origin.
pub(crate) fn validate_domain_name(domain: &str) -> std::result::Result<(), String> {
    if domain.is_empty() {
        return Err("domain name cannot be empty".to_string());
    }

    if domain.len() > 253 {
        return Err(format!("domain name too long: {} chars (max 253)", domain.len()));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err("domain name has an empty label".to_string());
        }

        if label.len() > 63 {
            return Err(format!("label '{label}' too long: {} chars (max 63)", label.len()));
        }

        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("label '{label}' contains invalid characters"));
        }
    }

    Ok(())
}
