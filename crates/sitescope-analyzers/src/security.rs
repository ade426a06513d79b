//! Security audit.
//!
//! Works entirely from crawled artefacts: page URLs, response headers,
//! Set-Cookie values, raw HTML and HTML comments. Severity maps onto issue
//! priority (high/medium/low). Header-absence findings are site-wide: one
//! issue per missing header rather than one per page.

use crate::plugin::{build_result, parse_config, status_from_findings, Analyzer, AnalyzerInfo};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use sitescope_extraction::PageDocument;
use sitescope_store::Snapshot;
use sitescope_types::{Finding, IssuePriority, Result, TestResult};
use std::collections::BTreeMap;

/// Response headers whose absence is reported, with severity.
const EXPECTED_HEADERS: &[(&str, IssuePriority)] = &[
    ("content-security-policy", IssuePriority::Medium),
    ("strict-transport-security", IssuePriority::Medium),
    ("x-frame-options", IssuePriority::Low),
    ("x-content-type-options", IssuePriority::Low),
];

/// Path fragments that should never be reachable.
const EXPOSED_PATHS: &[&str] = &[
    "/.git", "/.env", "/.htaccess", "/admin", "/backup", "/.svn", "/.DS_Store",
];

/// Comment content that suggests information disclosure.
const COMMENT_MARKERS: &[&str] = &[
    "password", "secret", "api key", "api_key", "apikey", "token", "internal", "fixme", "debug",
];

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Also flag http:// pages (disable for intentionally plain sites).
    #[serde(default = "default_true")]
    pub require_https: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_https: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

pub struct SecurityAudit;

#[async_trait]
impl Analyzer for SecurityAudit {
    fn describe(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: "security-audit",
            description: "HTTPS, security headers, cookie flags, exposed paths, comment leaks",
            config_schema: schemars::schema_for!(SecurityConfig),
        }
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        config: &serde_json::Value,
    ) -> Result<TestResult> {
        let started_at = Utc::now();
        let config: SecurityConfig = parse_config(config)?;

        let mut findings = Vec::new();
        let mut severity_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mixed_content = Regex::new(r#"(?:src|href)\s*=\s*["']http://"#)
            .map_err(|e| sitescope_types::EngineError::internal(format!("bad regex: {e}")))?;

        let pages = snapshot.pages()?;
        let mut missing_headers: BTreeMap<&'static str, usize> = BTreeMap::new();

        for page in &pages {
            let url = page.url();

            if config.require_https && url.scheme() == "http" {
                findings.push(
                    Finding::new(url.clone(), "insecure-scheme", "page served over plain HTTP")
                        .with_priority(IssuePriority::High),
                );
            }

            if url.scheme() == "https" {
                let raw = page.raw_html().await?;
                if mixed_content.is_match(&raw) {
                    findings.push(
                        Finding::new(
                            url.clone(),
                            "mixed-content",
                            "HTTPS page references http:// resources",
                        )
                        .with_priority(IssuePriority::Medium),
                    );
                }
            }

            for (header, _) in EXPECTED_HEADERS {
                // HSTS only means something over TLS.
                if *header == "strict-transport-security" && url.scheme() != "https" {
                    continue;
                }
                if !page.record.response_headers.contains_key(*header) {
                    *missing_headers.entry(header).or_default() += 1;
                }
            }

            if let Some(set_cookie) = page.record.response_headers.get("set-cookie") {
                for cookie in set_cookie.split('\n') {
                    let lower = cookie.to_lowercase();
                    let name = cookie.split('=').next().unwrap_or("cookie").trim();
                    let mut missing_flags = Vec::new();
                    if url.scheme() == "https" && !lower.contains("secure") {
                        missing_flags.push("Secure");
                    }
                    if !lower.contains("httponly") {
                        missing_flags.push("HttpOnly");
                    }
                    if !lower.contains("samesite") {
                        missing_flags.push("SameSite");
                    }
                    if !missing_flags.is_empty() {
                        findings.push(
                            Finding::new(
                                url.clone(),
                                format!("cookie-flags-{name}"),
                                format!(
                                    "cookie {name:?} is missing {}",
                                    missing_flags.join(", ")
                                ),
                            )
                            .with_priority(IssuePriority::Medium)
                            .with_detail(json!({"cookie": name, "missing": missing_flags})),
                        );
                    }
                }
            }

            let raw = page.raw_html().await?;
            let doc = PageDocument::parse(&raw);
            for comment in &doc.comments {
                let lower = comment.to_lowercase();
                if let Some(marker) = COMMENT_MARKERS.iter().find(|m| lower.contains(**m)) {
                    findings.push(
                        Finding::new(
                            url.clone(),
                            "comment-disclosure",
                            format!("HTML comment mentions {marker:?}"),
                        )
                        .with_priority(IssuePriority::Low)
                        .with_detail(json!({
                            "marker": marker,
                            "comment": comment.chars().take(200).collect::<String>(),
                        })),
                    );
                    break;
                }
            }
        }

        // One site-wide finding per missing header kind.
        for (header, severity) in EXPECTED_HEADERS {
            if let Some(count) = missing_headers.get(header) {
                findings.push(
                    Finding::new(
                        snapshot.root_url().clone(),
                        format!("missing-header-{header}"),
                        format!("{header} absent on {count} of {} pages", pages.len()),
                    )
                    .with_priority(*severity)
                    .site_wide(),
                );
            }
        }

        // Exposed paths anywhere the crawl touched, including links that
        // were discovered but not crawled.
        for entry in &snapshot.sitemap().pages {
            let path = entry.url.path().to_lowercase();
            if let Some(exposed) = EXPOSED_PATHS
                .iter()
                .find(|p| path.starts_with(&p.to_lowercase()))
            {
                findings.push(
                    Finding::new(
                        entry.url.clone(),
                        "exposed-path",
                        format!("sensitive path {exposed:?} is reachable"),
                    )
                    .with_priority(IssuePriority::High),
                );
            }
        }

        for finding in &findings {
            let bucket = match finding.priority {
                IssuePriority::High => "high",
                IssuePriority::Medium => "medium",
                IssuePriority::Low => "low",
            };
            *severity_counts.entry(bucket).or_default() += 1;
        }

        let status = status_from_findings(&findings);
        let summary = format!(
            "{} findings ({} high, {} medium, {} low) across {} pages",
            findings.len(),
            severity_counts.get("high").copied().unwrap_or(0),
            severity_counts.get("medium").copied().unwrap_or(0),
            severity_counts.get("low").copied().unwrap_or(0),
            pages.len()
        );
        let details = json!({
            "pages_analyzed": pages.len(),
            "severity_counts": severity_counts,
            "missing_headers": missing_headers,
            "findings": findings
                .iter()
                .map(|f| json!({
                    "url": f.url.as_str(),
                    "category": f.category,
                    "message": f.message,
                    "priority": f.priority.as_str(),
                }))
                .collect::<Vec<_>>(),
        });
        let info = self.describe();
        Ok(build_result(
            &info, snapshot, started_at, status, summary, details, findings,
        ))
    }
}
