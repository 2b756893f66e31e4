//! Zone content source
//!
//! Produces the body of a zone file: either rendered from a static rule list
//! or downloaded from a remote feed and stripped of the feed's own header.

use crate::error::Result;
use crate::traits::FeedSource;
use crate::zone::{Rule, ZoneKind, ZoneSpec};
use tracing::debug;

/// Produce the body lines for `zone`
///
/// Static zones never touch `feed`.
pub async fn zone_body(zone: &ZoneSpec, feed: &dyn FeedSource) -> Result<Vec<String>> {
    match &zone.kind {
        ZoneKind::Static { rules } => Ok(render_rules(rules)),
        ZoneKind::Remote { url, .. } => {
            let lines = feed.fetch_lines(url).await?;
            let received = lines.len();
            let body = filter_feed(lines);
            debug!(
                zone = %zone.name,
                source = feed.source_name(),
                "Feed filtered: {} of {} lines kept",
                body.len(),
                received
            );
            Ok(body)
        }
    }
}

/// Render static rules as RPZ CNAME records, in rule order
///
/// Each rule yields `<trigger> CNAME <action>`, followed by
/// `*.<trigger> CNAME <action>` when it covers subdomains.
pub fn render_rules(rules: &[Rule]) -> Vec<String> {
    let mut lines = Vec::with_capacity(rules.len() * 2);
    for rule in rules {
        lines.push(format!("{} CNAME {}", rule.trigger, rule.action.literal()));
        if rule.include_subdomains {
            lines.push(format!("*.{} CNAME {}", rule.trigger, rule.action.literal()));
        }
    }
    lines
}

/// Drop blank lines and the feed's own SOA, NS and `$TTL` lines
///
/// Kept lines are returned untouched and in their original order. Matching
/// is textual: a line containing `SOA` anywhere is treated as a SOA record.
pub fn filter_feed<I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    lines.into_iter().filter(|line| keep_feed_line(line)).collect()
}

/// Whether a single feed line survives [`filter_feed`]
pub fn keep_feed_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    !(is_soa_line(trimmed) || is_ns_line(trimmed) || is_ttl_line(trimmed))
}

fn is_soa_line(line: &str) -> bool {
    line.contains("SOA")
}

fn is_ns_line(line: &str) -> bool {
    if line.starts_with("NS") || line.starts_with("@ IN NS") || line.starts_with("@ NS") {
        return true;
    }

    // Owner-named NS records: `<owner> NS ...` or `<owner> IN NS ...`
    let mut fields = line.split_whitespace().skip(1);
    match fields.next() {
        Some("NS") => true,
        Some("IN") => fields.next() == Some("NS"),
        _ => false,
    }
}

fn is_ttl_line(line: &str) -> bool {
    line.starts_with("$TTL")
}
