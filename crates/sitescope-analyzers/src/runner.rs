//! Test runner: drives selected analyzers over a sealed snapshot.
//!
//! Analyzers run sequentially by default (parallelism is bounded and
//! opt-in). A timeout, panic or error in one analyzer becomes an `error`
//! result and never aborts the others; cancellation converts the remaining
//! analyzers to `cancelled` error results.

use crate::plugin::Analyzer;
use crate::registry::PluginHost;
use futures::{FutureExt, StreamExt};
use sitescope_store::Snapshot;
use sitescope_types::{Result, RunnerConfig, TestResult};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs analyzers against snapshots.
pub struct TestRunner {
    host: PluginHost,
    config: RunnerConfig,
}

impl TestRunner {
    pub fn new(host: PluginHost, config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { host, config })
    }

    pub fn host(&self) -> &PluginHost {
        &self.host
    }

    /// Run the selected analyzers (all when `selection` is empty) against
    /// `snapshot`, in caller order. Per-plugin configs come from `configs`
    /// keyed by plugin name.
    pub async fn run(
        &self,
        snapshot: &Snapshot,
        selection: &[String],
        configs: &HashMap<String, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<Vec<TestResult>> {
        let analyzers = self.host.resolve(selection)?;
        info!(
            snapshot = %snapshot.id(),
            analyzers = analyzers.len(),
            "starting test run"
        );

        let jobs: Vec<(Arc<dyn Analyzer>, serde_json::Value)> = analyzers
            .into_iter()
            .map(|analyzer| {
                let config = configs
                    .get(analyzer.describe().name)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                (analyzer, config)
            })
            .collect();

        // Sequential by default; bounded parallelism is opt-in. Result
        // order always follows the caller-supplied list. The snapshot is
        // read-only, so parallel analyzers share no mutable state.
        let results = if self.config.parallelism > 1 {
            futures::stream::iter(jobs.into_iter().map(|(analyzer, config)| {
                let cancel = cancel.clone();
                async move { self.run_one(analyzer, snapshot, &config, &cancel).await }
            }))
            .buffered(self.config.parallelism)
            .collect::<Vec<_>>()
            .await
        } else {
            let mut results = Vec::new();
            for (analyzer, config) in jobs {
                results.push(self.run_one(analyzer, snapshot, &config, &cancel).await);
            }
            results
        };
        Ok(results)
    }

    async fn run_one(
        &self,
        analyzer: Arc<dyn Analyzer>,
        snapshot: &Snapshot,
        config: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> TestResult {
        let name = analyzer.describe().name;
        if cancel.is_cancelled() {
            return TestResult::host_error(name, snapshot.id().clone(), "cancelled");
        }

        // The catch_unwind boundary turns analyzer panics into error
        // results instead of tearing down the run.
        let work = AssertUnwindSafe(analyzer.analyze(snapshot, config)).catch_unwind();
        let timed = tokio::time::timeout(self.config.per_plugin_timeout, work);

        let outcome = tokio::select! {
            outcome = timed => outcome,
            _ = cancel.cancelled() => {
                warn!(plugin = %name, "analyzer cancelled");
                return TestResult::host_error(name, snapshot.id().clone(), "cancelled");
            }
        };

        match outcome {
            Err(_elapsed) => {
                warn!(plugin = %name, timeout_s = self.config.per_plugin_timeout.as_secs(), "analyzer timed out");
                TestResult::host_error(name, snapshot.id().clone(), "timeout")
            }
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "analyzer panicked".to_string());
                error!(plugin = %name, panic = %message, "analyzer panicked");
                TestResult::host_error(
                    name,
                    snapshot.id().clone(),
                    format!("panic: {message}"),
                )
            }
            Ok(Ok(Err(err))) => {
                warn!(plugin = %name, error = %err, "analyzer failed");
                TestResult::host_error(name, snapshot.id().clone(), err.to_string())
            }
            Ok(Ok(Ok(result))) => {
                info!(
                    plugin = %name,
                    status = result.status.as_str(),
                    findings = result.findings.len(),
                    "analyzer finished"
                );
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::AnalyzerInfo;
    use async_trait::async_trait;
    use sitescope_store::SnapshotWriter;
    use sitescope_types::snapshot::SnapshotCounts;
    use sitescope_types::{
        CrawledPage, EngineError, PageRecord, SnapshotStatus, SnapshotSummary, TestStatus,
    };
    use std::time::Duration;
    use tempfile::TempDir;
    use url::Url;

    async fn sealed_snapshot(tmp: &TempDir) -> Snapshot {
        let root = Url::parse("https://a.test/").unwrap();
        let mut writer = SnapshotWriter::allocate(tmp.path(), root).expect("allocates");
        writer
            .write_page(&CrawledPage {
                record: PageRecord {
                    url: Url::parse("https://a.test/").unwrap(),
                    http_status: 200,
                    fetched_at: chrono::Utc::now(),
                    title: Some("t".to_string()),
                    response_headers: Default::default(),
                    outbound_links: Vec::new(),
                    depth: 0,
                },
                raw_html: "<html><body><p>hello</p></body></html>".to_string(),
                cleaned_html: "<html><body><p>hello</p></body></html>".to_string(),
                markdown: "hello\n".to_string(),
            })
            .await
            .expect("writes");
        let (id, _) = writer
            .seal(SnapshotSummary {
                started_at: chrono::Utc::now(),
                finished_at: chrono::Utc::now(),
                status: SnapshotStatus::Complete,
                counts: SnapshotCounts::default(),
                errors: Vec::new(),
                robots_enabled: true,
                cancellation_reason: None,
                warnings: Vec::new(),
            })
            .await
            .expect("seals");
        Snapshot::open(tmp.path(), &id).expect("opens")
    }

    struct PanickingAnalyzer;

    #[async_trait]
    impl Analyzer for PanickingAnalyzer {
        fn describe(&self) -> AnalyzerInfo {
            AnalyzerInfo {
                name: "panicking",
                description: "always panics",
                config_schema: schemars::schema_for!(()),
            }
        }

        async fn analyze(
            &self,
            _snapshot: &Snapshot,
            _config: &serde_json::Value,
        ) -> sitescope_types::Result<TestResult> {
            panic!("invariant breached in test analyzer");
        }
    }

    struct SlowAnalyzer;

    #[async_trait]
    impl Analyzer for SlowAnalyzer {
        fn describe(&self) -> AnalyzerInfo {
            AnalyzerInfo {
                name: "slow",
                description: "sleeps forever",
                config_schema: schemars::schema_for!(()),
            }
        }

        async fn analyze(
            &self,
            snapshot: &Snapshot,
            _config: &serde_json::Value,
        ) -> sitescope_types::Result<TestResult> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(EngineError::internal(format!(
                "unreachable for {}",
                snapshot.id()
            )))
        }
    }

    fn runner_with(analyzer: Arc<dyn Analyzer>, timeout: Duration) -> TestRunner {
        let host = PluginHost::new().with_analyzer(analyzer);
        TestRunner::new(
            host,
            RunnerConfig {
                per_plugin_timeout: timeout,
                parallelism: 1,
            },
        )
        .expect("valid config")
    }

    #[tokio::test]
    async fn panicking_analyzer_becomes_error_result() {
        let tmp = TempDir::new().unwrap();
        let snapshot = sealed_snapshot(&tmp).await;
        let runner = runner_with(Arc::new(PanickingAnalyzer), Duration::from_secs(5));

        let results = runner
            .run(
                &snapshot,
                &["panicking".to_string()],
                &HashMap::new(),
                CancellationToken::new(),
            )
            .await
            .expect("run returns");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, TestStatus::Error);
        assert!(results[0].summary.contains("panic"));
    }

    #[tokio::test]
    async fn timeout_converts_to_error_and_other_analyzers_continue() {
        let tmp = TempDir::new().unwrap();
        let snapshot = sealed_snapshot(&tmp).await;
        let runner = runner_with(Arc::new(SlowAnalyzer), Duration::from_millis(50));

        let results = runner
            .run(
                &snapshot,
                &["slow".to_string(), "seo-audit".to_string()],
                &HashMap::new(),
                CancellationToken::new(),
            )
            .await
            .expect("run returns");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, TestStatus::Error);
        assert_eq!(results[0].summary, "timeout");
        // The SEO audit still ran after the timeout.
        assert_ne!(results[1].status, TestStatus::Error);
    }

    #[tokio::test]
    async fn cancellation_marks_remaining_analyzers() {
        let tmp = TempDir::new().unwrap();
        let snapshot = sealed_snapshot(&tmp).await;
        let runner = runner_with(Arc::new(SlowAnalyzer), Duration::from_secs(3600));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = runner
            .run(
                &snapshot,
                &["slow".to_string()],
                &HashMap::new(),
                cancel,
            )
            .await
            .expect("run returns");
        assert_eq!(results[0].status, TestStatus::Error);
        assert_eq!(results[0].summary, "cancelled");
    }

    #[tokio::test]
    async fn bad_config_is_rejected_with_error_result() {
        let tmp = TempDir::new().unwrap();
        let snapshot = sealed_snapshot(&tmp).await;
        let runner = TestRunner::new(PluginHost::new(), RunnerConfig::default()).unwrap();

        let mut configs = HashMap::new();
        configs.insert(
            "seo-audit".to_string(),
            serde_json::json!({"unknown_option": true}),
        );
        let results = runner
            .run(
                &snapshot,
                &["seo-audit".to_string()],
                &configs,
                CancellationToken::new(),
            )
            .await
            .expect("run returns");
        assert_eq!(results[0].status, TestStatus::Error);
        assert!(results[0].summary.contains("config"));
    }

    #[tokio::test]
    async fn unknown_plugin_fails_before_running() {
        let tmp = TempDir::new().unwrap();
        let snapshot = sealed_snapshot(&tmp).await;
        let runner = TestRunner::new(PluginHost::new(), RunnerConfig::default()).unwrap();

        let err = runner
            .run(
                &snapshot,
                &["nope".to_string()],
                &HashMap::new(),
                CancellationToken::new(),
            )
            .await
            .expect_err("unknown plugin");
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn reruns_produce_identical_details() {
        let tmp = TempDir::new().unwrap();
        let snapshot = sealed_snapshot(&tmp).await;
        let runner = TestRunner::new(PluginHost::new(), RunnerConfig::default()).unwrap();

        let selection = vec!["seo-audit".to_string(), "security-audit".to_string()];
        let first = runner
            .run(&snapshot, &selection, &HashMap::new(), CancellationToken::new())
            .await
            .expect("first run");
        let second = runner
            .run(&snapshot, &selection, &HashMap::new(), CancellationToken::new())
            .await
            .expect("second run");

        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.details, b.details, "details differ for {}", a.plugin_name);
            assert_eq!(a.status, b.status);
        }
    }
}
