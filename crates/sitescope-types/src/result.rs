//! Analyzer invocation results and the findings they carry.

use crate::snapshot::SnapshotId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome class of one analyzer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// The analyzer ran and found nothing to report.
    Pass,
    /// The analyzer found problems that should fail a CI-style gate.
    Fail,
    /// The analyzer found problems below the failure threshold.
    Warning,
    /// The analyzer could not complete (timeout, panic, bad config).
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One analyzer-emitted observation. Findings are the raw material for
/// issues; they live inside a result's `details` and are not persisted
/// independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub url: url::Url,
    /// Stable category within the plugin, e.g. `missing-title`.
    pub category: String,
    pub message: String,
    /// When true, the issue fingerprint collapses to one site-wide issue
    /// instead of one per URL.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub site_wide: bool,
    /// Severity hint mapped onto issue priority at promotion time.
    #[serde(default)]
    pub priority: crate::issue::IssuePriority,
    /// Analyzer-specific payload (match text, line numbers, scores...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl Finding {
    pub fn new(url: url::Url, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url,
            category: category.into(),
            message: message.into(),
            site_wide: false,
            priority: crate::issue::IssuePriority::Medium,
            detail: Value::Null,
        }
    }

    pub fn with_priority(mut self, priority: crate::issue::IssuePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn site_wide(mut self) -> Self {
        self.site_wide = true;
        self
    }
}

/// One analyzer invocation over one snapshot. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub plugin_name: String,
    pub snapshot_id: SnapshotId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: TestStatus,
    /// One-line human summary.
    pub summary: String,
    /// Analyzer-specific structured payload. Bit-identical across re-runs
    /// over the same sealed snapshot.
    pub details: Value,
    /// Findings extracted for issue promotion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
}

impl TestResult {
    /// An `error` result produced by the host rather than the analyzer
    /// (timeout, panic, config rejection).
    pub fn host_error(
        plugin_name: impl Into<String>,
        snapshot_id: SnapshotId,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            snapshot_id,
            started_at: Utc::now(),
            duration_ms: 0,
            status: TestStatus::Error,
            summary: summary.into(),
            details: Value::Null,
            findings: Vec::new(),
        }
    }
}
