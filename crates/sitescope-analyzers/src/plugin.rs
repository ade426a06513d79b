//! The analyzer contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::schema::RootSchema;
use serde::de::DeserializeOwned;
use sitescope_store::Snapshot;
use sitescope_types::{EngineError, Finding, IssuePriority, Result, TestResult, TestStatus};

/// Static description of an analyzer, including its config schema.
#[derive(Debug, Clone)]
pub struct AnalyzerInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub config_schema: RootSchema,
}

/// A test plugin: one method to describe it, one to execute it.
///
/// Analyzers are pure with respect to the snapshot: they read page content
/// freely, never modify snapshot files, and never touch the network.
/// Re-running over the same sealed snapshot must produce bit-identical
/// `details` (the timestamp lives outside `details`).
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn describe(&self) -> AnalyzerInfo;

    async fn analyze(&self, snapshot: &Snapshot, config: &serde_json::Value)
        -> Result<TestResult>;
}

/// Deserialize a plugin config strictly; unknown or mistyped fields reject
/// the run.
pub fn parse_config<T: DeserializeOwned + Default>(config: &serde_json::Value) -> Result<T> {
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone())
        .map_err(|e| EngineError::invalid_config(format!("config rejected by schema: {e}")))
}

/// Derive the overall status from a finding list: any high-priority finding
/// fails the run, anything else warns, nothing passes.
pub fn status_from_findings(findings: &[Finding]) -> TestStatus {
    if findings.is_empty() {
        TestStatus::Pass
    } else if findings.iter().any(|f| f.priority == IssuePriority::High) {
        TestStatus::Fail
    } else {
        TestStatus::Warning
    }
}

/// Assemble a result under the uniform reporting contract.
pub fn build_result(
    info: &AnalyzerInfo,
    snapshot: &Snapshot,
    started_at: DateTime<Utc>,
    status: TestStatus,
    summary: String,
    details: serde_json::Value,
    findings: Vec<Finding>,
) -> TestResult {
    TestResult {
        plugin_name: info.name.to_string(),
        snapshot_id: snapshot.id().clone(),
        started_at,
        duration_ms: (Utc::now() - started_at).num_milliseconds().max(0) as u64,
        status,
        summary,
        details,
        findings,
    }
}
