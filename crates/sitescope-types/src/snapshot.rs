//! Snapshot records: the immutable output of one crawl.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Identifier of a snapshot: a lexicographically sortable UTC timestamp,
/// `%Y%m%d%H%M%S`, with a `-N` suffix on same-second collisions.
pub type SnapshotId = String;

/// Format a snapshot id from a timestamp.
pub fn snapshot_id_from(ts: DateTime<Utc>) -> SnapshotId {
    ts.format("%Y%m%d%H%M%S").to_string()
}

/// Terminal status of a sealed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// The crawl ran to natural completion.
    Complete,
    /// The crawl was cut short (page cap, timeout, cancellation, back-off).
    Partial,
    /// The crawl could not produce any pages.
    Failed,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// One crawled page inside a snapshot. Written once, immutable after seal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// Canonical (normalised) URL of the page.
    pub url: Url,
    pub http_status: u16,
    pub fetched_at: DateTime<Utc>,
    /// Document title, when one was present.
    pub title: Option<String>,
    /// Response headers, lowercased names, order-stable.
    pub response_headers: BTreeMap<String, String>,
    /// Internal outbound links, already normalised and absolute.
    pub outbound_links: Vec<Url>,
    /// Link depth from the crawl root.
    pub depth: u32,
}

/// Full artefact set for one crawled page, streamed from the crawl
/// orchestrator to the snapshot writer over a bounded channel.
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub record: PageRecord,
    pub raw_html: String,
    pub cleaned_html: String,
    pub markdown: String,
}

/// A per-URL failure recorded in the snapshot summary. Individual failures
/// never abort a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlErrorEntry {
    pub url: Url,
    /// One of `network`, `timeout`, `http_error`, `render_error`, `robots`.
    pub kind: String,
    pub message: String,
}

/// Aggregate counts for a sealed snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotCounts {
    pub pages: usize,
    pub errors: usize,
}

/// `summary.json` written at seal time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: SnapshotStatus,
    pub counts: SnapshotCounts,
    pub errors: Vec<CrawlErrorEntry>,
    /// Echo of the robots setting so results stay auditable.
    pub robots_enabled: bool,
    /// Set when the crawl stopped before the frontier drained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    /// Non-fatal warnings (back-pressure pauses, robots fetch failures).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SnapshotSummary {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// One URL the crawl touched, crawled or merely discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub url: Url,
    /// HTTP status for crawled URLs; absent for discovered-only ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub depth: u32,
}

/// `sitemap.json`: the set of all URLs touched during the crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sitemap {
    pub root: Url,
    pub pages: Vec<SitemapEntry>,
}
