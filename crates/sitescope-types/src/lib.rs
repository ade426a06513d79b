//! Shared data model for the sitescope website analysis engine.
//!
//! This crate defines the types that cross crate boundaries: projects,
//! snapshots, pages, test results, findings, issues, the engine error
//! taxonomy and the crawl/runner configuration. It deliberately contains no
//! I/O; persistence lives in `sitescope-store` and network access in
//! `sitescope-crawler`.

pub mod config;
pub mod error;
pub mod issue;
pub mod project;
pub mod result;
pub mod snapshot;

pub use config::{CrawlConfig, RunnerConfig, MAX_PAGES_CEILING};
pub use error::{EngineError, ErrorEnvelope, Result};
pub use issue::{Issue, IssuePriority, IssueRegister, IssueStatus, IssueTransition};
pub use project::{slug_from_url, Project};
pub use result::{Finding, TestResult, TestStatus};
pub use snapshot::{
    CrawlErrorEntry, CrawledPage, PageRecord, Sitemap, SitemapEntry, SnapshotId, SnapshotStatus,
    SnapshotSummary,
};
