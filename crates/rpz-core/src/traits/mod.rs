//! Core traits for the RPZ loader
//!
//! This module defines the seams between the sync pipeline and the outside
//! world.
//!
//! - [`FeedSource`]: Download remote feeds
//! - [`ZoneServer`]: Apply zone files to the authoritative server
//! - [`MetricsSink`]: Receive job outcomes

pub mod feed_source;
pub mod zone_server;
pub mod metrics_sink;

pub use feed_source::FeedSource;
pub use zone_server::ZoneServer;
pub use metrics_sink::{MetricsSink, NoopMetrics};
