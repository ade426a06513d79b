//! Per-host robots.txt policy.
//!
//! `/robots.txt` is fetched once per host and cached for the lifetime of
//! the crawl. Fetch failures are treated as allow-all with no delay, but
//! the failure is recorded so the snapshot summary can report it. The
//! whole policy can be disabled by configuration; callers echo the setting
//! into the snapshot summary to keep results auditable.

use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Longest crawl-delay honoured, to keep a hostile robots.txt from
/// stalling the crawl.
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct HostRobots {
    content: String,
    crawl_delay: Duration,
}

/// Cached robots.txt evaluation for one crawl.
pub struct RobotsPolicy {
    enabled: bool,
    user_agent: String,
    client: reqwest::Client,
    cache: DashMap<String, HostRobots>,
    fetch_failures: Mutex<Vec<String>>,
}

impl RobotsPolicy {
    pub fn new(enabled: bool, user_agent: String, client: reqwest::Client) -> Self {
        Self {
            enabled,
            user_agent,
            client,
            cache: DashMap::new(),
            fetch_failures: Mutex::new(Vec::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Is this URL allowed for our user agent?
    pub async fn allowed(&self, url: &Url) -> bool {
        if !self.enabled {
            return true;
        }
        let robots = self.robots_for(url).await;
        if robots.content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        let allowed =
            matcher.one_agent_allowed_by_robots(&robots.content, &self.user_agent, url.as_str());
        debug!(url = %url, allowed = allowed, "robots.txt check");
        allowed
    }

    /// Crawl delay for the URL's host; zero when unspecified or disabled.
    pub async fn crawl_delay(&self, url: &Url) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        self.robots_for(url).await.crawl_delay
    }

    /// Hosts whose robots.txt could not be fetched this crawl.
    pub fn fetch_failures(&self) -> Vec<String> {
        self.fetch_failures
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    async fn robots_for(&self, url: &Url) -> HostRobots {
        let host_key = match url.host_str() {
            Some(host) => match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            },
            None => {
                return HostRobots {
                    content: String::new(),
                    crawl_delay: Duration::ZERO,
                }
            }
        };

        if let Some(cached) = self.cache.get(&host_key) {
            return cached.clone();
        }

        let robots_url = format!("{host_key}/robots.txt");
        let content = match self.fetch_robots(&robots_url).await {
            Ok(content) => content,
            Err(message) => {
                warn!(host = %host_key, error = %message, "robots.txt fetch failed; allowing all");
                if let Ok(mut failures) = self.fetch_failures.lock() {
                    failures.push(host_key.clone());
                }
                String::new()
            }
        };

        let crawl_delay = extract_crawl_delay(&content)
            .map(|d| d.min(MAX_CRAWL_DELAY))
            .unwrap_or(Duration::ZERO);
        let robots = HostRobots {
            content,
            crawl_delay,
        };
        self.cache.insert(host_key, robots.clone());
        robots
    }

    async fn fetch_robots(&self, robots_url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(robots_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            response.text().await.map_err(|e| e.to_string())
        } else {
            // Missing robots.txt is permissive, not a failure.
            debug!(robots_url = %robots_url, status = %response.status(), "no robots.txt");
            Ok(String::new())
        }
    }
}

/// Parse a `crawl-delay` directive out of robots.txt content.
fn extract_crawl_delay(content: &str) -> Option<Duration> {
    for line in content.lines() {
        let line = line.trim().to_lowercase();
        if let Some(value) = line.strip_prefix("crawl-delay:") {
            if let Ok(secs) = value.trim().parse::<f64>() {
                if secs > 0.0 {
                    return Some(Duration::from_secs_f64(secs));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn policy(enabled: bool) -> RobotsPolicy {
        RobotsPolicy::new(
            enabled,
            "Sitescope/0.3".to_string(),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn crawl_delay_parses_and_clamps() {
        assert_eq!(
            extract_crawl_delay("User-agent: *\nCrawl-delay: 2.5\n"),
            Some(Duration::from_secs_f64(2.5))
        );
        assert_eq!(extract_crawl_delay("Disallow: /x"), None);
    }

    #[tokio::test]
    async fn disabled_policy_allows_everything() {
        let policy = policy(false);
        let url = Url::parse("https://a.test/blocked").unwrap();
        assert!(policy.allowed(&url).await);
        assert_eq!(policy.crawl_delay(&url).await, Duration::ZERO);
    }

    #[tokio::test]
    async fn disallow_rules_are_honoured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /private/\nCrawl-delay: 1\n"),
            )
            .mount(&server)
            .await;

        let policy = policy(true);
        let blocked = Url::parse(&format!("{}/private/page", server.uri())).unwrap();
        let open = Url::parse(&format!("{}/public", server.uri())).unwrap();

        assert!(!policy.allowed(&blocked).await);
        assert!(policy.allowed(&open).await);
        assert_eq!(policy.crawl_delay(&open).await, Duration::from_secs(1));
        assert!(policy.fetch_failures().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_allows_all_and_is_recorded() {
        // Nothing is listening on this port.
        let policy = policy(true);
        let url = Url::parse("http://127.0.0.1:1/page").unwrap();
        assert!(policy.allowed(&url).await);
        assert_eq!(policy.fetch_failures().len(), 1);
    }

    #[tokio::test]
    async fn missing_robots_is_permissive_without_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let policy = policy(true);
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        assert!(policy.allowed(&url).await);
        assert!(policy.fetch_failures().is_empty());
    }
}
