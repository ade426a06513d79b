//! End-to-end flows through the engine facade: crawl a mock site into a
//! sealed snapshot, run analyzers, and track issues across repeated runs.

use sitescope_crawler::EventSink;
use sitescope_engine::Engine;
use sitescope_types::{CrawlConfig, IssueStatus, RunnerConfig, SnapshotStatus, TestStatus};
use std::collections::HashMap;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn crawl_config() -> CrawlConfig {
    CrawlConfig {
        max_pages: 20,
        respect_robots: false,
        global_concurrency: 1,
        ..Default::default()
    }
}

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

async fn crawl(engine: &Engine, slug: &str) -> String {
    let (snapshot_id, summary) = engine
        .crawl_site(
            slug,
            crawl_config(),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .expect("crawl succeeds");
    assert_eq!(summary.status, SnapshotStatus::Complete);
    snapshot_id
}

#[tokio::test]
async fn crawl_produces_ordered_sealed_snapshot() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        r#"<html><body><a href="/x">x</a><a href="/y">y</a></body></html>"#,
    )
    .await;
    serve(&server, "/x", "<html><body>x</body></html>").await;
    serve(&server, "/y", "<html><body>y</body></html>").await;

    let tmp = TempDir::new().unwrap();
    let engine = Engine::new(tmp.path()).unwrap();
    let root = Url::parse(&server.uri()).unwrap();
    let project = engine.create_project(&root).unwrap();

    let snapshot_id = crawl(&engine, &project.slug).await;

    let snapshots = engine.list_snapshots(&project.slug).unwrap();
    assert_eq!(snapshots, vec![snapshot_id]);

    // Deterministic admission order: root, then its links in document order.
    let project_dir = tmp
        .path()
        .join("projects")
        .join(&project.slug)
        .join("snapshots")
        .join(&snapshots[0]);
    let sitemap: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(project_dir.join("sitemap.json")).unwrap())
            .unwrap();
    let paths: Vec<String> = sitemap["pages"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["status"].is_number())
        .map(|p| Url::parse(p["url"].as_str().unwrap()).unwrap().path().to_string())
        .collect();
    assert_eq!(paths, vec!["/", "/x", "/y"]);
    assert!(project_dir.join(".complete").is_file());
    assert!(!project_dir.join(".partial").exists());
}

#[tokio::test]
async fn pattern_scanner_reports_line_numbers_and_context() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        "<html><body><div>line1\nfoo bar\nbaz</div></body></html>",
    )
    .await;

    let tmp = TempDir::new().unwrap();
    let engine = Engine::new(tmp.path()).unwrap();
    let root = Url::parse(&server.uri()).unwrap();
    let project = engine.create_project(&root).unwrap();
    crawl(&engine, &project.slug).await;

    let mut configs = HashMap::new();
    configs.insert(
        "pattern-scan".to_string(),
        serde_json::json!({"patterns": {"legacy-foo": "foo"}}),
    );
    let (run, _report) = engine
        .run_tests(
            &project.slug,
            None,
            &["pattern-scan".to_string()],
            &configs,
            RunnerConfig::default(),
            CancellationToken::new(),
        )
        .await
        .expect("test run succeeds");

    let result = run.result_for("pattern-scan").expect("result present");
    assert_eq!(result.status, TestStatus::Fail);
    assert_eq!(result.findings.len(), 1);
    let detail = &result.findings[0].detail;
    assert_eq!(detail["line_number"], 2);
    let context = detail["context"].as_str().unwrap();
    assert!(context.contains("line1"));
    assert!(context.contains("baz"));
}

#[tokio::test]
async fn issues_resolve_and_reopen_across_runs() {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::new(tmp.path()).unwrap();

    let with_bug = "<html><body><p>DEPRECATED_WIDGET here</p></body></html>";
    let without_bug = "<html><body><p>all clean now</p></body></html>";

    let mut configs = HashMap::new();
    configs.insert(
        "pattern-scan".to_string(),
        serde_json::json!({"patterns": {"deprecated-widget": "DEPRECATED_WIDGET"}}),
    );
    let selection = vec!["pattern-scan".to_string()];

    // Run 1: the finding opens an issue.
    let server = MockServer::start().await;
    serve(&server, "/", with_bug).await;
    let root = Url::parse(&server.uri()).unwrap();
    let project = engine.create_project(&root).unwrap();
    crawl(&engine, &project.slug).await;
    let (_, report) = engine
        .run_tests(
            &project.slug,
            None,
            &selection,
            &configs,
            RunnerConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.opened.len(), 1);

    let issues = engine.list_issues(&project.slug, None, None).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].status, IssueStatus::Open);
    let first_detected = issues[0].first_detected_at;

    // Run 2: page is clean; the plugin ran, so absence resolves the issue.
    server.reset().await;
    serve(&server, "/", without_bug).await;
    crawl(&engine, &project.slug).await;
    let (_, report) = engine
        .run_tests(
            &project.slug,
            None,
            &selection,
            &configs,
            RunnerConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.resolved.len(), 1);
    let issue = &engine.list_issues(&project.slug, None, None).unwrap()[0];
    assert_eq!(issue.status, IssueStatus::Fixed);
    assert!(issue.resolved_at.is_some());
    assert_eq!(issue.history.len(), 2);

    // Run 3: the bug returns; fixed -> open with history intact.
    server.reset().await;
    serve(&server, "/", with_bug).await;
    crawl(&engine, &project.slug).await;
    let (_, report) = engine
        .run_tests(
            &project.slug,
            None,
            &selection,
            &configs,
            RunnerConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.reopened.len(), 1);
    let issue = &engine.list_issues(&project.slug, None, None).unwrap()[0];
    assert_eq!(issue.status, IssueStatus::Open);
    assert_eq!(issue.history.len(), 3);
    assert_eq!(issue.first_detected_at, first_detected);
    assert!(issue.resolved_at.is_none());
}

#[tokio::test]
async fn example_bug_finder_flags_similar_pages() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        r#"<html><body><a href="/seed">s</a><a href="/similar">m</a><a href="/clean">c</a></body></html>"#,
    )
    .await;
    serve(
        &server,
        "/seed",
        r#"<html><body><p>[[{"fid":"1101026","view_mode":"full_width"}]]</p></body></html>"#,
    )
    .await;
    serve(
        &server,
        "/similar",
        r#"<html><body><p>[[ {'fid': '9', 'view_mode' : 'short'} ]]</p></body></html>"#,
    )
    .await;
    serve(&server, "/clean", "<html><body><p>nothing odd</p></body></html>").await;

    let tmp = TempDir::new().unwrap();
    let engine = Engine::new(tmp.path()).unwrap();
    let root = Url::parse(&server.uri()).unwrap();
    let project = engine.create_project(&root).unwrap();
    crawl(&engine, &project.slug).await;

    let mut configs = HashMap::new();
    configs.insert(
        "example-bug".to_string(),
        serde_json::json!({"seed_url": "/seed"}),
    );
    let (run, _) = engine
        .run_tests(
            &project.slug,
            None,
            &["example-bug".to_string()],
            &configs,
            RunnerConfig::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let result = run.result_for("example-bug").unwrap();
    assert_eq!(result.status, TestStatus::Fail);
    let flagged: Vec<&str> = result
        .findings
        .iter()
        .map(|f| f.url.path())
        .collect();
    assert!(flagged.contains(&"/seed"));
    assert!(flagged.contains(&"/similar"));
    assert!(!flagged.contains(&"/clean"));
}

#[tokio::test]
async fn cancelled_crawl_seals_partial_without_marker() {
    let server = MockServer::start().await;
    serve(&server, "/", "<html><body>root</body></html>").await;

    let tmp = TempDir::new().unwrap();
    let engine = Engine::new(tmp.path()).unwrap();
    let root = Url::parse(&server.uri()).unwrap();
    let project = engine.create_project(&root).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (snapshot_id, summary) = engine
        .crawl_site(&project.slug, crawl_config(), EventSink::disabled(), cancel)
        .await
        .expect("cancelled crawl still seals");

    assert_eq!(summary.status, SnapshotStatus::Partial);
    assert!(summary.cancellation_reason.is_some());

    let dir = tmp
        .path()
        .join("projects")
        .join(&project.slug)
        .join("snapshots")
        .join(&snapshot_id);
    assert!(dir.join(".complete").is_file());
    assert!(!dir.join(".partial").exists());
}

#[tokio::test]
async fn run_against_missing_snapshot_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::new(tmp.path()).unwrap();
    let root = Url::parse("https://never-crawled.test/").unwrap();
    let project = engine.create_project(&root).unwrap();

    let err = engine
        .run_tests(
            &project.slug,
            None,
            &[],
            &HashMap::new(),
            RunnerConfig::default(),
            CancellationToken::new(),
        )
        .await
        .expect_err("no snapshot yet");
    assert_eq!(err.kind(), "not_found");
}
