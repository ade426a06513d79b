//! Crawl orchestrator: drives the frontier, robots policy and fetcher
//! under concurrency, page-count and time bounds.
//!
//! A fixed pool of workers dequeues from the frontier; finished pages
//! stream to the snapshot writer over the bounded channel supplied by the
//! caller. Individual URL failures are recorded and never abort the crawl.

use crate::events::{CrawlEvent, EventSink};
use crate::fetch::{FetchOptions, Fetcher};
use crate::frontier::{Frontier, RequestOutcome, SubmitOutcome};
use crate::robots::RobotsPolicy;
use crate::url_norm::{normalize_url, same_site};
use chrono::{DateTime, Utc};
use sitescope_types::{
    CrawlConfig, CrawlErrorEntry, CrawledPage, EngineError, PageRecord, SnapshotStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// What the crawl produced, handed to the snapshot writer at seal time.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub status: SnapshotStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_crawled: usize,
    pub errors: Vec<CrawlErrorEntry>,
    pub warnings: Vec<String>,
    pub robots_enabled: bool,
    pub cancellation_reason: Option<String>,
}

enum StopCause {
    Drained,
    Cancelled,
    Timeout,
}

/// Concurrent site crawler.
pub struct Crawler {
    config: CrawlConfig,
    fetcher: Fetcher,
}

struct WorkerCtx {
    config: CrawlConfig,
    fetcher: Fetcher,
    frontier: Arc<Frontier>,
    robots: Arc<RobotsPolicy>,
    root: Url,
    pages: mpsc::Sender<CrawledPage>,
    events: EventSink,
    errors: Arc<Mutex<Vec<CrawlErrorEntry>>>,
    pages_done: Arc<AtomicUsize>,
}

impl Crawler {
    pub fn new(mut config: CrawlConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let fetcher = Fetcher::new(&config.user_agent)?;
        Ok(Self { config, fetcher })
    }

    /// Replace the fetcher (used to plug in a JS renderer).
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Run a crawl from `root_url`, streaming pages into `pages`.
    ///
    /// Returns once every worker has stopped; the page sender is dropped at
    /// that point, which is the writer's end-of-stream signal.
    pub async fn crawl(
        &self,
        root_url: &Url,
        pages: mpsc::Sender<CrawledPage>,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<CrawlOutcome, EngineError> {
        let started_at = Utc::now();
        let root = normalize_url(root_url, &self.config.tracking_params);
        let frontier = Arc::new(Frontier::new(root.clone(), &self.config)?);
        let robots = Arc::new(RobotsPolicy::new(
            self.config.respect_robots,
            self.config.user_agent.clone(),
            self.fetcher.client(),
        ));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let pages_done = Arc::new(AtomicUsize::new(0));

        events.emit(CrawlEvent::Started { root: root.clone() });
        info!(root = %root, max_pages = self.config.max_pages, "starting crawl");

        match frontier.submit(&root, 0).await {
            SubmitOutcome::Admitted | SubmitOutcome::CapReached => {}
            outcome => {
                return Err(EngineError::usage(format!(
                    "root URL was not admitted to the crawl: {outcome:?}"
                )))
            }
        }

        let mut workers = Vec::with_capacity(self.config.global_concurrency);
        for worker_id in 0..self.config.global_concurrency {
            let ctx = WorkerCtx {
                config: self.config.clone(),
                fetcher: self.fetcher.clone(),
                frontier: frontier.clone(),
                robots: robots.clone(),
                root: root.clone(),
                pages: pages.clone(),
                events: events.clone(),
                errors: errors.clone(),
                pages_done: pages_done.clone(),
            };
            workers.push(tokio::spawn(worker_loop(worker_id, ctx)));
        }
        // Workers hold their own clones; drop ours so the writer sees the
        // stream end when the last worker exits.
        drop(pages);

        let drain = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        tokio::pin!(drain);

        let stop = tokio::select! {
            _ = &mut drain => StopCause::Drained,
            _ = cancel.cancelled() => StopCause::Cancelled,
            _ = tokio::time::sleep(self.config.overall_timeout) => StopCause::Timeout,
        };

        if !matches!(stop, StopCause::Drained) {
            // In-flight fetches finish within per_page_timeout; no new
            // URLs are handed out once the frontier is closed.
            frontier.close().await;
            drain.await;
        }

        let pages_crawled = pages_done.load(Ordering::SeqCst);
        let errors = Arc::try_unwrap(errors)
            .map(Mutex::into_inner)
            .unwrap_or_default();

        let mut warnings: Vec<String> = robots
            .fetch_failures()
            .into_iter()
            .map(|host| format!("robots.txt fetch failed for {host}; treated as allow-all"))
            .collect();
        if frontier.backpressure_hit().await {
            warnings.push("frontier ceiling reached; link discovery was paused".to_string());
        }

        let dropped_by_cap = frontier.dropped_by_cap().await;
        let (status, cancellation_reason) = match stop {
            StopCause::Cancelled => (
                SnapshotStatus::Partial,
                Some("cancelled by caller".to_string()),
            ),
            StopCause::Timeout => (
                SnapshotStatus::Partial,
                Some(format!(
                    "overall timeout of {}s reached",
                    self.config.overall_timeout.as_secs()
                )),
            ),
            StopCause::Drained => {
                if pages_crawled == 0 && !errors.is_empty() {
                    (SnapshotStatus::Failed, None)
                } else if dropped_by_cap > 0 && self.config.max_pages > 0 {
                    (
                        SnapshotStatus::Partial,
                        Some(format!("max_pages limit of {} reached", self.config.max_pages)),
                    )
                } else {
                    (SnapshotStatus::Complete, None)
                }
            }
        };

        for warning in &warnings {
            events.emit(CrawlEvent::Warning {
                message: warning.clone(),
            });
        }
        events.emit(CrawlEvent::Finished {
            status,
            pages: pages_crawled,
            errors: errors.len(),
        });
        info!(
            pages = pages_crawled,
            errors = errors.len(),
            status = status.as_str(),
            "crawl finished"
        );

        Ok(CrawlOutcome {
            status,
            started_at,
            finished_at: Utc::now(),
            pages_crawled,
            errors,
            warnings,
            robots_enabled: self.config.respect_robots,
            cancellation_reason,
        })
    }
}

async fn worker_loop(worker_id: usize, ctx: WorkerCtx) {
    debug!(worker = worker_id, "crawl worker started");
    while let Some((url, depth)) = ctx.frontier.next().await {
        process_url(&ctx, url, depth).await;
    }
    debug!(worker = worker_id, "crawl worker stopped");
}

async fn process_url(ctx: &WorkerCtx, url: Url, depth: u32) {
    if ctx.robots.enabled() {
        if !ctx.robots.allowed(&url).await {
            debug!(url = %url, "disallowed by robots.txt");
            ctx.frontier.complete(&url, RequestOutcome::Failure).await;
            return;
        }
        let delay = ctx.robots.crawl_delay(&url).await;
        if !delay.is_zero() {
            if let Some(host) = url.host_str() {
                ctx.frontier.set_crawl_delay(host, delay).await;
            }
        }
    }

    let options = FetchOptions {
        timeout: ctx.config.per_page_timeout,
        ..Default::default()
    };
    match ctx.fetcher.fetch(&url, &options).await {
        Ok(page) => {
            let outcome = match page.http_status {
                429 => RequestOutcome::RateLimited,
                500..=599 => RequestOutcome::ServerError,
                _ => RequestOutcome::Success,
            };

            if page.is_http_error() {
                ctx.errors.lock().await.push(CrawlErrorEntry {
                    url: url.clone(),
                    kind: "http_error".to_string(),
                    message: format!("HTTP {}", page.http_status),
                });
            }

            // Normalised internal links: recorded on the page and fed back
            // into the frontier at depth + 1.
            let mut internal: Vec<Url> = Vec::new();
            for link in &page.links {
                let normalized = normalize_url(link, &ctx.config.tracking_params);
                if same_site(&ctx.root, &normalized, ctx.config.include_subdomains)
                    && !internal.contains(&normalized)
                {
                    internal.push(normalized);
                }
            }
            for link in &internal {
                if ctx.frontier.submit(link, depth + 1).await == SubmitOutcome::BackPressure {
                    warn!(url = %link, "dropped by frontier back-pressure");
                }
            }

            let record = PageRecord {
                url: url.clone(),
                http_status: page.http_status,
                fetched_at: page.fetched_at,
                title: page.title.clone(),
                response_headers: page.headers.clone(),
                outbound_links: internal,
                depth,
            };
            let crawled = CrawledPage {
                record,
                raw_html: page.raw_html,
                cleaned_html: page.cleaned_html,
                markdown: page.markdown,
            };

            // Bounded channel: this is the explicit back-pressure point
            // between fetching and snapshot writing.
            if ctx.pages.send(crawled).await.is_err() {
                warn!(url = %url, "snapshot writer is gone; stopping worker");
                ctx.frontier.close().await;
                ctx.frontier.complete(&url, outcome).await;
                return;
            }
            let done = ctx.pages_done.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.events.emit(CrawlEvent::PageCrawled {
                url: url.clone(),
                http_status: page.http_status,
                depth,
                pages_done: done,
            });

            ctx.frontier.complete(&url, outcome).await;
        }
        Err(err) => {
            let kind = err.kind.as_str().to_string();
            ctx.errors.lock().await.push(CrawlErrorEntry {
                url: url.clone(),
                kind: kind.clone(),
                message: err.message.clone(),
            });
            ctx.events.emit(CrawlEvent::PageFailed {
                url: url.clone(),
                kind,
                message: err.message,
            });
            ctx.frontier.complete(&url, RequestOutcome::Failure).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve_page(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    fn test_config(max_pages: usize) -> CrawlConfig {
        CrawlConfig {
            max_pages,
            respect_robots: false,
            global_concurrency: 2,
            ..Default::default()
        }
    }

    async fn run_crawl(
        config: CrawlConfig,
        root: &Url,
    ) -> (CrawlOutcome, Vec<CrawledPage>) {
        let crawler = Crawler::new(config).expect("valid config");
        let (tx, mut rx) = mpsc::channel(16);
        let collector = tokio::spawn(async move {
            let mut pages = Vec::new();
            while let Some(page) = rx.recv().await {
                pages.push(page);
            }
            pages
        });
        let outcome = crawler
            .crawl(root, tx, EventSink::disabled(), CancellationToken::new())
            .await
            .expect("crawl runs");
        let pages = collector.await.expect("collector finishes");
        (outcome, pages)
    }

    #[tokio::test]
    async fn crawls_linked_pages_breadth_first() {
        let server = MockServer::start().await;
        serve_page(
            &server,
            "/",
            r#"<html><body><a href="/x">x</a><a href="/y">y</a></body></html>"#,
        )
        .await;
        serve_page(&server, "/x", "<html><body>x</body></html>").await;
        serve_page(&server, "/y", "<html><body>y</body></html>").await;

        let root = Url::parse(&server.uri()).unwrap();
        let mut config = test_config(10);
        // Single worker keeps completion order deterministic for the test.
        config.global_concurrency = 1;
        let (outcome, pages) = run_crawl(config, &root).await;

        assert_eq!(outcome.status, SnapshotStatus::Complete);
        assert_eq!(outcome.pages_crawled, 3);
        let paths: Vec<String> = pages.iter().map(|p| p.record.url.path().to_string()).collect();
        assert_eq!(paths, vec!["/", "/x", "/y"]);
    }

    #[tokio::test]
    async fn max_depth_zero_crawls_only_the_root() {
        let server = MockServer::start().await;
        serve_page(
            &server,
            "/",
            r#"<html><body><a href="/x">x</a></body></html>"#,
        )
        .await;
        serve_page(&server, "/x", "<html><body>x</body></html>").await;

        let root = Url::parse(&server.uri()).unwrap();
        let config = CrawlConfig {
            max_depth: Some(0),
            ..test_config(10)
        };
        let (outcome, pages) = run_crawl(config, &root).await;
        assert_eq!(pages.len(), 1);
        assert_eq!(outcome.status, SnapshotStatus::Complete);
    }

    #[tokio::test]
    async fn max_pages_zero_yields_empty_complete_crawl() {
        let server = MockServer::start().await;
        serve_page(&server, "/", "<html><body>root</body></html>").await;

        let root = Url::parse(&server.uri()).unwrap();
        let (outcome, pages) = run_crawl(test_config(0), &root).await;
        assert!(pages.is_empty());
        assert_eq!(outcome.status, SnapshotStatus::Complete);
        assert_eq!(outcome.pages_crawled, 0);
    }

    #[tokio::test]
    async fn max_pages_cap_seals_partial() {
        let server = MockServer::start().await;
        serve_page(
            &server,
            "/",
            r#"<html><body><a href="/a">a</a><a href="/b">b</a><a href="/c">c</a></body></html>"#,
        )
        .await;
        for route in ["/a", "/b", "/c"] {
            serve_page(&server, route, "<html><body>p</body></html>").await;
        }

        let root = Url::parse(&server.uri()).unwrap();
        let (outcome, pages) = run_crawl(test_config(2), &root).await;
        assert_eq!(pages.len(), 2);
        assert_eq!(outcome.status, SnapshotStatus::Partial);
        assert!(outcome
            .cancellation_reason
            .as_deref()
            .unwrap()
            .contains("max_pages"));
    }

    #[tokio::test]
    async fn cancellation_seals_partial_with_reason() {
        let server = MockServer::start().await;
        serve_page(&server, "/", "<html><body>root</body></html>").await;

        let root = Url::parse(&server.uri()).unwrap();
        let crawler = Crawler::new(test_config(10)).expect("valid config");
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = crawler
            .crawl(&root, tx, EventSink::disabled(), cancel)
            .await
            .expect("crawl returns");
        while rx.recv().await.is_some() {}

        assert_eq!(outcome.status, SnapshotStatus::Partial);
        assert_eq!(
            outcome.cancellation_reason.as_deref(),
            Some("cancelled by caller")
        );
    }

    #[tokio::test]
    async fn fetch_failures_are_recorded_not_fatal() {
        let server = MockServer::start().await;
        serve_page(
            &server,
            "/",
            r#"<html><body><a href="/dead">dead</a></body></html>"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/dead"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let root = Url::parse(&server.uri()).unwrap();
        let (outcome, pages) = run_crawl(test_config(10), &root).await;

        // The 500 page is still an artefact; the error entry records it.
        assert_eq!(pages.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, "http_error");
    }
}
