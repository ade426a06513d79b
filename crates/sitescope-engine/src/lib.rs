//! The stable library API over the sitescope engine.
//!
//! Every consumer (CLI, scheduler, RPC facade) drives the engine through
//! [`Engine`]: project lifecycle, crawls into sealed snapshots, test runs
//! with result persistence and issue promotion, and issue queries. The
//! only process-wide state is the workspace root, set at construction.

use sitescope_analyzers::{AnalyzerInfo, PluginHost, TestRunner};
use sitescope_crawler::Crawler;
use sitescope_store::{
    IssueTracker, PromotionReport, ResultStore, RunDiff, Snapshot, SnapshotWriter, TestRun,
    Workspace,
};
use sitescope_types::{
    CrawlConfig, EngineError, Issue, IssueStatus, Project, Result, RunnerConfig, SnapshotId,
    SnapshotSummary,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use url::Url;

pub use sitescope_analyzers::plugin::Analyzer;
pub use sitescope_crawler::{CrawlEvent, EventSink};
pub use sitescope_store::{PageHandle, StatusChange};

/// Capacity of the page stream between the crawl workers and the snapshot
/// writer; the explicit back-pressure point.
const PAGE_CHANNEL_CAPACITY: usize = 32;

/// Facade over crawler, store and analyzers for one workspace root.
pub struct Engine {
    workspace: Workspace,
    host: PluginHost,
}

impl Engine {
    pub fn new(workspace_root: impl Into<std::path::PathBuf>) -> Result<Self> {
        Ok(Self {
            workspace: Workspace::open(workspace_root)?,
            host: PluginHost::new(),
        })
    }

    /// Replace the plugin host (used to inject additional analyzers).
    pub fn with_host(mut self, host: PluginHost) -> Self {
        self.host = host;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    // ---- projects ----

    pub fn create_project(&self, url: &Url) -> Result<Project> {
        Ok(self.workspace.create_project(url)?.project().clone())
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.workspace.list_projects()
    }

    pub fn list_snapshots(&self, slug: &str) -> Result<Vec<SnapshotId>> {
        self.workspace.open_project(slug)?.list_snapshots()
    }

    pub fn delete_snapshot(&self, slug: &str, snapshot_id: &str) -> Result<()> {
        let project = self.workspace.open_project(slug)?;
        let _lock = project.lock_writer()?;
        project.delete_snapshot(snapshot_id)
    }

    // ---- crawling ----

    /// Crawl a project's site into a new sealed snapshot.
    ///
    /// Holds the project writer lock for the duration. Progress events are
    /// emitted through `events`; `cancel` seals the snapshot as partial.
    pub async fn crawl_site(
        &self,
        slug: &str,
        config: CrawlConfig,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(SnapshotId, SnapshotSummary)> {
        let mut project = self.workspace.open_project(slug)?;
        let _lock = project.lock_writer()?;

        let root = project.root_url().clone();
        let crawler = Crawler::new(config)?;
        let mut writer = SnapshotWriter::allocate(&project.snapshots_dir(), root.clone())?;
        let snapshot_id = writer.snapshot_id().clone();

        let (tx, mut rx) = mpsc::channel(PAGE_CHANNEL_CAPACITY);
        let writer_task = tokio::spawn(async move {
            while let Some(page) = rx.recv().await {
                if let Err(err) = writer.write_page(&page).await {
                    error!(error = %err, "snapshot write failed; aborting intake");
                    break;
                }
            }
            writer
        });

        let outcome = crawler.crawl(&root, tx, events, cancel).await?;
        let writer = writer_task
            .await
            .map_err(|e| EngineError::internal(format!("snapshot writer task failed: {e}")))?;

        let (snapshot_id_sealed, summary) = writer
            .seal(SnapshotSummary {
                started_at: outcome.started_at,
                finished_at: outcome.finished_at,
                status: outcome.status,
                counts: Default::default(),
                errors: outcome.errors,
                robots_enabled: outcome.robots_enabled,
                cancellation_reason: outcome.cancellation_reason,
                warnings: outcome.warnings,
            })
            .await?;
        debug_assert_eq!(snapshot_id, snapshot_id_sealed);

        project.touch()?;
        info!(slug = %slug, snapshot = %snapshot_id_sealed, "crawl complete");
        Ok((snapshot_id_sealed, summary))
    }

    // ---- analyzers ----

    pub fn list_plugins(&self) -> Vec<AnalyzerInfo> {
        self.host.list()
    }

    /// Run analyzers over a snapshot (latest sealed by default), persist
    /// the results and fold them into the issue register.
    pub async fn run_tests(
        &self,
        slug: &str,
        snapshot_id: Option<&str>,
        selection: &[String],
        configs: &HashMap<String, serde_json::Value>,
        runner_config: RunnerConfig,
        cancel: CancellationToken,
    ) -> Result<(TestRun, PromotionReport)> {
        let mut project = self.workspace.open_project(slug)?;
        let _lock = project.lock_writer()?;

        let snapshot_id = match snapshot_id {
            Some(id) => id.to_string(),
            None => project
                .latest_snapshot()?
                .ok_or_else(|| EngineError::not_found("sealed snapshot for project", slug))?,
        };
        let snapshot = Snapshot::open(&project.snapshots_dir(), &snapshot_id)?;

        let runner = TestRunner::new(self.host.clone(), runner_config)?;
        let results = runner.run(&snapshot, selection, configs, cancel).await?;

        let run = ResultStore::new(project.results_dir()).append(&snapshot_id, results)?;
        let report = IssueTracker::new(project.issues_path()).promote(&run.results)?;

        project.touch()?;
        info!(
            slug = %slug,
            run = %run.run_id,
            opened = report.opened.len(),
            resolved = report.resolved.len(),
            "test run stored"
        );
        Ok((run, report))
    }

    pub fn list_runs(&self, slug: &str) -> Result<Vec<String>> {
        let project = self.workspace.open_project(slug)?;
        ResultStore::new(project.results_dir()).list()
    }

    pub fn load_run(&self, slug: &str, run_id: &str) -> Result<TestRun> {
        let project = self.workspace.open_project(slug)?;
        ResultStore::new(project.results_dir()).load(run_id)
    }

    pub fn compare_runs(&self, slug: &str, older: &str, newer: &str) -> Result<RunDiff> {
        let project = self.workspace.open_project(slug)?;
        ResultStore::new(project.results_dir()).compare(older, newer)
    }

    // ---- issues ----

    pub fn list_issues(
        &self,
        slug: &str,
        status: Option<IssueStatus>,
        plugin: Option<&str>,
    ) -> Result<Vec<Issue>> {
        let project = self.workspace.open_project(slug)?;
        IssueTracker::new(project.issues_path()).list(status, plugin)
    }

    pub fn transition_issue(
        &self,
        slug: &str,
        issue_id: &str,
        to: IssueStatus,
        actor: &str,
    ) -> Result<Issue> {
        let project = self.workspace.open_project(slug)?;
        let _lock = project.lock_writer()?;
        IssueTracker::new(project.issues_path()).transition(issue_id, to, actor)
    }
}
