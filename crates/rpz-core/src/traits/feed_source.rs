// # Feed Source Trait
//
// Defines the interface for retrieving a remote RPZ feed.
//
// ## Implementations
//
// - HTTP: `rpz-feed-http` crate
//
// ## Usage
//
// ```rust,ignore
// use rpz_core::FeedSource;
//
// let lines = source.fetch_lines("https://feeds.example/rpz.zone").await?;
// let body = rpz_core::content::filter_feed(lines);
// ```

use async_trait::async_trait;

/// Trait for remote feed retrieval
///
/// A feed source downloads the feed and splits it into lines. It does not
/// filter anything: removing the feed's own header records is the job of
/// [`content::filter_feed`](crate::content::filter_feed), so every source
/// gets the same treatment.
///
/// # Contract
///
/// - One download per call, no retries (a failed job waits for its next
///   scheduled trigger)
/// - Any 2xx status is success; everything else is [`Error::Fetch`](crate::Error::Fetch)
/// - The whole body is returned before the caller writes anything, so a
///   failure mid-download leaves the zone file untouched
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Download the feed at `url` and return its lines in order
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped; the line text is
    /// otherwise unmodified.
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
