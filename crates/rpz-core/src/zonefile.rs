// # Zone File Writer
//
// Materializes a complete zone file: a synthesized header followed by the
// body produced by the content source.
//
// ## File Format
//
// ```text
// $ORIGIN blocklist.
// $TTL 60
// @ IN SOA ns1.example.net. hostmaster.example.net. 2025010912 3600 600 604800 30
// @ IN NS ns1.example.net.
//
// bad.example CNAME .
// *.bad.example CNAME .
// ```
//
// ## Atomicity
//
// Content is written to a temporary sibling file and renamed over the
// target, so the nameserver never loads a half-written zone. Files are
// always regenerated in full.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::zone::ZoneSpec;

/// Serial format: hour granularity (`YYYYMMDDHH`)
const SERIAL_FORMAT: &str = "%Y%m%d%H";

/// A generated zone file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneFile {
    /// Where the file lives
    pub path: PathBuf,
    /// Rendered header block, including the trailing blank line
    pub header: String,
    /// Body records, one per line
    pub body: Vec<String>,
}

impl ZoneFile {
    /// Assemble a zone file for `zone` using `serial`
    pub fn new(zone: &ZoneSpec, serial: u32, body: Vec<String>) -> Self {
        Self {
            path: zone.file_path.clone(),
            header: render_header(zone, serial),
            body,
        }
    }

    /// Full file content
    pub fn render(&self) -> String {
        let body_len: usize = self.body.iter().map(|l| l.len() + 1).sum();
        let mut out = String::with_capacity(self.header.len() + body_len);
        out.push_str(&self.header);
        for line in &self.body {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Render the header block for `zone`
///
/// Order is fixed: `$ORIGIN`, `$TTL`, SOA, NS, blank line.
pub fn render_header(zone: &ZoneSpec, serial: u32) -> String {
    let origin = fqdn(&zone.name);
    let nameserver = fqdn(&zone.soa.nameserver);
    let rname = fqdn(&hostmaster_rname(&zone.soa.hostmaster_email));

    format!(
        "$ORIGIN {origin}\n\
         $TTL {ttl}\n\
         @ IN SOA {nameserver} {rname} {serial} {refresh} {retry} {expire} {negative_ttl}\n\
         @ IN NS {nameserver}\n\
         \n",
        ttl = zone.ttl,
        refresh = zone.soa.refresh,
        retry = zone.soa.retry,
        expire = zone.soa.expire,
        negative_ttl = zone.soa.negative_ttl,
    )
}

/// Serial number for a given instant
///
/// Two syncs within the same hour share a serial; zone loads replace the
/// whole zone so the server does not compare serials.
pub fn serial_at(now: DateTime<Utc>) -> u32 {
    // Ten digits up to year 4294
    now.format(SERIAL_FORMAT).to_string().parse().unwrap_or(u32::MAX)
}

/// Append a trailing dot unless present
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Convert a hostmaster email to SOA RNAME form
pub fn hostmaster_rname(email: &str) -> String {
    email.replace('@', ".")
}

/// Writes zone files to disk
#[derive(Debug, Clone, Default)]
pub struct ZoneFileWriter;

impl ZoneFileWriter {
    /// Create a new writer
    pub fn new() -> Self {
        Self
    }

    /// Render and atomically write the zone file for `zone`
    pub async fn write(&self, zone: &ZoneSpec, body: Vec<String>) -> Result<ZoneFile> {
        let file = ZoneFile::new(zone, serial_at(Utc::now()), body);
        write_atomic(&file.path, file.render().as_bytes()).await?;

        tracing::trace!(zone = %zone.name, "Zone file written: {}", file.path.display());
        Ok(file)
    }
}

/// Write `content` to `path` via a temporary file and rename
async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::write(format!(
                    "Failed to create zone directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let temp_path = temp_path(path);
    {
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            Error::write(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.write_all(content).await.map_err(|e| {
            Error::write(format!(
                "Failed to write to temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.flush().await.map_err(|e| {
            Error::write(format!(
                "Failed to flush temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::write(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })
}

/// Temporary sibling used for atomic writes
fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    PathBuf::from(temp)
}
