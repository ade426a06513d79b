//! Crawl and test-runner configuration.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling on `max_pages`, regardless of configuration.
pub const MAX_PAGES_CEILING: usize = 10_000;

/// Serde module for `Duration` as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Bounds and policies for one crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Crawl admission ceiling. Clamped to [`MAX_PAGES_CEILING`].
    pub max_pages: usize,
    /// Link-depth ceiling; `None` means unbounded.
    pub max_depth: Option<u32>,
    /// Maximum in-flight requests per host.
    pub per_host_concurrency: usize,
    /// Maximum in-flight requests overall.
    pub global_concurrency: usize,
    /// Per-request fetch timeout.
    #[serde(with = "duration_secs")]
    pub per_page_timeout: Duration,
    /// Wall-clock ceiling for the whole crawl.
    #[serde(with = "duration_secs")]
    pub overall_timeout: Duration,
    /// Honour robots.txt. The setting is echoed into the snapshot summary.
    pub respect_robots: bool,
    /// Admit subdomains of the root's registrable domain.
    pub include_subdomains: bool,
    /// Path globs; when non-empty, only matching paths are admitted.
    pub include_patterns: Vec<String>,
    /// Path globs; matching paths are rejected.
    pub exclude_patterns: Vec<String>,
    /// Query parameters stripped during normalisation.
    pub tracking_params: Vec<String>,
    /// Frontier in-memory ceiling before enqueue pauses (back-pressure).
    pub frontier_ceiling: usize,
    /// User-Agent header for fetches and robots checks.
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 1000,
            max_depth: None,
            per_host_concurrency: 5,
            global_concurrency: 16,
            per_page_timeout: Duration::from_secs(60),
            overall_timeout: Duration::from_secs(4 * 3600),
            respect_robots: true,
            include_subdomains: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            tracking_params: vec![
                "utm_source".to_string(),
                "utm_medium".to_string(),
                "utm_campaign".to_string(),
                "utm_term".to_string(),
                "utm_content".to_string(),
                "gclid".to_string(),
                "fbclid".to_string(),
            ],
            frontier_ceiling: 100_000,
            user_agent: "Sitescope/0.3".to_string(),
        }
    }
}

impl CrawlConfig {
    /// Validate and clamp. `max_pages = 0` is legal and yields an empty
    /// complete snapshot.
    pub fn validate(&mut self) -> Result<(), EngineError> {
        if self.max_pages > MAX_PAGES_CEILING {
            self.max_pages = MAX_PAGES_CEILING;
        }
        if self.per_host_concurrency == 0 {
            return Err(EngineError::invalid_config_field(
                "per_host_concurrency must be at least 1",
                "per_host_concurrency",
            ));
        }
        if self.global_concurrency == 0 {
            return Err(EngineError::invalid_config_field(
                "global_concurrency must be at least 1",
                "global_concurrency",
            ));
        }
        if self.per_page_timeout.is_zero() {
            return Err(EngineError::invalid_config_field(
                "per_page_timeout must be non-zero",
                "per_page_timeout",
            ));
        }
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            glob_syntax_check(pattern)?;
        }
        Ok(())
    }
}

fn glob_syntax_check(pattern: &str) -> Result<(), EngineError> {
    // Reject obviously broken patterns early; full compilation happens in
    // the frontier's admission filter.
    if pattern.is_empty() {
        return Err(EngineError::invalid_config(
            "empty glob pattern".to_string(),
        ));
    }
    Ok(())
}

/// Test-runner policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Per-analyzer timeout.
    #[serde(with = "duration_secs")]
    pub per_plugin_timeout: Duration,
    /// Analyzers run sequentially unless this is raised above 1.
    pub parallelism: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            per_plugin_timeout: Duration::from_secs(300),
            parallelism: 1,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.parallelism == 0 {
            return Err(EngineError::invalid_config_field(
                "parallelism must be at least 1",
                "parallelism",
            ));
        }
        Ok(())
    }
}
