//! Append-only test-result store.
//!
//! Each test run writes one timestamped file under `test-results/`. Nothing
//! mutates a result in place; manual deletion for archival is the only way
//! a file disappears.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitescope_types::{EngineError, Result, SnapshotId, TestResult, TestStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// One test run: every analyzer invocation from a single `test run` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub run_id: String,
    pub snapshot_id: SnapshotId,
    pub started_at: DateTime<Utc>,
    pub results: Vec<TestResult>,
}

impl TestRun {
    pub fn result_for(&self, plugin_name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.plugin_name == plugin_name)
    }

    /// Worst status across the run, for exit-code mapping.
    pub fn worst_status(&self) -> Option<TestStatus> {
        let severity = |status: TestStatus| match status {
            TestStatus::Pass => 0,
            TestStatus::Warning => 1,
            TestStatus::Fail => 2,
            TestStatus::Error => 3,
        };
        self.results
            .iter()
            .map(|r| r.status)
            .max_by_key(|s| severity(*s))
    }
}

/// Per-plugin status change between two runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub plugin_name: String,
    pub from: TestStatus,
    pub to: TestStatus,
}

/// Difference between two test runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunDiff {
    /// Plugins present only in the newer run.
    pub added_plugins: Vec<String>,
    /// Plugins present only in the older run.
    pub removed_plugins: Vec<String>,
    pub status_changes: Vec<StatusChange>,
    /// Finding-count delta per plugin (new minus old).
    pub finding_deltas: BTreeMap<String, i64>,
}

impl RunDiff {
    pub fn is_empty(&self) -> bool {
        self.added_plugins.is_empty()
            && self.removed_plugins.is_empty()
            && self.status_changes.is_empty()
            && self.finding_deltas.values().all(|d| *d == 0)
    }
}

/// Store rooted at a project's `test-results/` directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: results_dir.into(),
        }
    }

    /// Append a run. The run id doubles as the file stem; same-second runs
    /// get a `-N` suffix like snapshot ids.
    pub fn append(&self, snapshot_id: &str, results: Vec<TestResult>) -> Result<TestRun> {
        std::fs::create_dir_all(&self.dir)?;
        let started_at = Utc::now();
        let base = started_at.format("%Y%m%d%H%M%S").to_string();
        let mut run_id = base.clone();
        let mut attempt = 1usize;
        let path = loop {
            let candidate = self.dir.join(format!("{run_id}.json"));
            if !candidate.exists() {
                break candidate;
            }
            attempt += 1;
            run_id = format!("{base}-{attempt}");
        };

        let run = TestRun {
            run_id: run_id.clone(),
            snapshot_id: snapshot_id.to_string(),
            started_at,
            results,
        };
        let json = serde_json::to_string_pretty(&run)
            .map_err(|e| EngineError::internal(format!("run serialization: {e}")))?;
        std::fs::write(&path, json)?;
        info!(run = %run_id, path = %path.display(), "stored test run");
        Ok(run)
    }

    /// All run ids, ascending.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(ids),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn load(&self, run_id: &str) -> Result<TestRun> {
        let path = self.dir.join(format!("{run_id}.json"));
        if !path.is_file() {
            return Err(EngineError::not_found("test run", run_id));
        }
        let run = serde_json::from_str(&std::fs::read_to_string(&path)?)
            .map_err(|e| EngineError::resource(format!("corrupt test run {run_id:?}: {e}")))?;
        Ok(run)
    }

    /// Latest stored result for one plugin, if any run included it.
    pub fn latest(&self, plugin_name: &str) -> Result<Option<TestResult>> {
        for run_id in self.list()?.into_iter().rev() {
            let run = self.load(&run_id)?;
            if let Some(result) = run.result_for(plugin_name) {
                return Ok(Some(result.clone()));
            }
        }
        Ok(None)
    }

    /// Compare two stored runs (older, newer).
    pub fn compare(&self, older_id: &str, newer_id: &str) -> Result<RunDiff> {
        let older = self.load(older_id)?;
        let newer = self.load(newer_id)?;
        Ok(diff_runs(&older, &newer))
    }
}

/// Diff two runs without touching the store.
pub fn diff_runs(older: &TestRun, newer: &TestRun) -> RunDiff {
    let mut diff = RunDiff::default();

    for result in &newer.results {
        match older.result_for(&result.plugin_name) {
            None => diff.added_plugins.push(result.plugin_name.clone()),
            Some(previous) => {
                if previous.status != result.status {
                    diff.status_changes.push(StatusChange {
                        plugin_name: result.plugin_name.clone(),
                        from: previous.status,
                        to: result.status,
                    });
                }
                let delta = result.findings.len() as i64 - previous.findings.len() as i64;
                diff.finding_deltas
                    .insert(result.plugin_name.clone(), delta);
            }
        }
    }
    for result in &older.results {
        if newer.result_for(&result.plugin_name).is_none() {
            diff.removed_plugins.push(result.plugin_name.clone());
        }
    }
    diff.added_plugins.sort();
    diff.removed_plugins.sort();
    diff
}
