//! SEO audit.
//!
//! Per-page checks: title presence and 30-60 char length, meta description
//! presence and 50-160 char length, exactly one H1, heading-level
//! monotonicity, image alt coverage. Site-level checks: duplicate titles
//! and descriptions, robots.txt availability and a sitemap reference.
//! Produces a 0-10 score with categorised critical/warning/opportunity
//! lists.

use crate::plugin::{build_result, parse_config, status_from_findings, Analyzer, AnalyzerInfo};
use async_trait::async_trait;
use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use sitescope_extraction::PageDocument;
use sitescope_store::Snapshot;
use sitescope_types::{Finding, IssuePriority, Result, TestResult};
use std::collections::BTreeMap;
use url::Url;

const TITLE_RANGE: (usize, usize) = (30, 60);
const DESCRIPTION_RANGE: (usize, usize) = (50, 160);

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SeoConfig {
    /// Fail the run when the score drops below this threshold.
    #[serde(default = "default_fail_below")]
    pub fail_below: f64,
}

impl Default for SeoConfig {
    fn default() -> Self {
        Self {
            fail_below: default_fail_below(),
        }
    }
}

fn default_fail_below() -> f64 {
    4.0
}

#[derive(Default)]
struct CheckLists {
    critical: Vec<serde_json::Value>,
    warnings: Vec<serde_json::Value>,
    opportunities: Vec<serde_json::Value>,
}

impl CheckLists {
    fn score(&self) -> f64 {
        let raw = 10.0
            - 2.0 * self.critical.len() as f64
            - 1.0 * self.warnings.len() as f64
            - 0.5 * self.opportunities.len() as f64;
        (raw.clamp(0.0, 10.0) * 10.0).round() / 10.0
    }
}

pub struct SeoAudit;

impl SeoAudit {
    fn check_page(
        url: &Url,
        doc: &PageDocument,
        lists: &mut CheckLists,
        findings: &mut Vec<Finding>,
    ) {
        match &doc.title {
            None => {
                lists.critical.push(json!({"url": url.as_str(), "check": "title", "message": "page has no <title>"}));
                findings.push(
                    Finding::new(url.clone(), "missing-title", "page has no <title>")
                        .with_priority(IssuePriority::High),
                );
            }
            Some(title) => {
                let len = title.chars().count();
                if len < TITLE_RANGE.0 || len > TITLE_RANGE.1 {
                    lists.warnings.push(json!({
                        "url": url.as_str(),
                        "check": "title-length",
                        "message": format!("title is {len} chars; aim for {}-{}", TITLE_RANGE.0, TITLE_RANGE.1),
                    }));
                    findings.push(Finding::new(
                        url.clone(),
                        "title-length",
                        format!("title length {len} outside {}-{}", TITLE_RANGE.0, TITLE_RANGE.1),
                    ));
                }
            }
        }

        match &doc.meta_description {
            None => {
                lists.critical.push(json!({"url": url.as_str(), "check": "description", "message": "page has no meta description"}));
                findings.push(
                    Finding::new(url.clone(), "missing-description", "page has no meta description")
                        .with_priority(IssuePriority::High),
                );
            }
            Some(description) => {
                let len = description.chars().count();
                if len < DESCRIPTION_RANGE.0 || len > DESCRIPTION_RANGE.1 {
                    lists.warnings.push(json!({
                        "url": url.as_str(),
                        "check": "description-length",
                        "message": format!("description is {len} chars; aim for {}-{}", DESCRIPTION_RANGE.0, DESCRIPTION_RANGE.1),
                    }));
                    findings.push(Finding::new(
                        url.clone(),
                        "description-length",
                        format!(
                            "meta description length {len} outside {}-{}",
                            DESCRIPTION_RANGE.0, DESCRIPTION_RANGE.1
                        ),
                    ));
                }
            }
        }

        let h1_count = doc.h1_count();
        if h1_count != 1 {
            lists.warnings.push(json!({
                "url": url.as_str(),
                "check": "h1-count",
                "message": format!("expected exactly one H1, found {h1_count}"),
            }));
            findings.push(Finding::new(
                url.clone(),
                "h1-count",
                format!("expected exactly one H1, found {h1_count}"),
            ));
        }

        if !doc.headings_monotonic() {
            lists.opportunities.push(json!({
                "url": url.as_str(),
                "check": "heading-hierarchy",
                "message": "heading levels skip (e.g. H1 -> H3)",
            }));
            findings.push(
                Finding::new(url.clone(), "heading-hierarchy", "heading levels skip")
                    .with_priority(IssuePriority::Low),
            );
        }

        let missing_alt = doc.images.iter().filter(|img| img.alt.is_none()).count();
        if missing_alt > 0 {
            lists.warnings.push(json!({
                "url": url.as_str(),
                "check": "image-alt",
                "message": format!("{missing_alt} of {} images lack alt text", doc.images.len()),
            }));
            findings.push(Finding::new(
                url.clone(),
                "image-alt",
                format!("{missing_alt} images lack alt text"),
            ));
        }
    }
}

#[async_trait]
impl Analyzer for SeoAudit {
    fn describe(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: "seo-audit",
            description: "Page and site-level SEO checks with a 0-10 score",
            config_schema: schemars::schema_for!(SeoConfig),
        }
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        config: &serde_json::Value,
    ) -> Result<TestResult> {
        let started_at = Utc::now();
        let config: SeoConfig = parse_config(config)?;

        let mut lists = CheckLists::default();
        let mut findings = Vec::new();
        let mut titles: BTreeMap<String, Vec<Url>> = BTreeMap::new();
        let mut descriptions: BTreeMap<String, Vec<Url>> = BTreeMap::new();
        let mut sitemap_referenced = false;

        let pages = snapshot.pages()?;
        for page in &pages {
            let raw = page.raw_html().await?;
            let doc = PageDocument::parse(&raw);
            Self::check_page(page.url(), &doc, &mut lists, &mut findings);

            if let Some(title) = &doc.title {
                titles.entry(title.clone()).or_default().push(page.url().clone());
            }
            if let Some(description) = &doc.meta_description {
                descriptions
                    .entry(description.clone())
                    .or_default()
                    .push(page.url().clone());
            }
            if raw.contains("sitemap.xml") {
                sitemap_referenced = true;
            }
        }

        for (title, urls) in &titles {
            if urls.len() > 1 {
                lists.critical.push(json!({
                    "check": "duplicate-title",
                    "message": format!("title {title:?} is shared by {} pages", urls.len()),
                    "urls": urls.iter().map(Url::as_str).collect::<Vec<_>>(),
                }));
                findings.push(
                    Finding::new(
                        urls[0].clone(),
                        "duplicate-title",
                        format!("title {title:?} is shared by {} pages", urls.len()),
                    )
                    .with_priority(IssuePriority::High)
                    .site_wide(),
                );
            }
        }
        for (description, urls) in &descriptions {
            if urls.len() > 1 {
                lists.critical.push(json!({
                    "check": "duplicate-description",
                    "message": format!("meta description is shared by {} pages", urls.len()),
                    "urls": urls.iter().map(Url::as_str).collect::<Vec<_>>(),
                }));
                findings.push(
                    Finding::new(
                        urls[0].clone(),
                        "duplicate-description",
                        format!("meta description {description:?} is shared by {} pages", urls.len()),
                    )
                    .with_priority(IssuePriority::High)
                    .site_wide(),
                );
            }
        }

        // Analyzers never fetch; robots availability comes from what the
        // crawl recorded.
        let robots_missing = snapshot.summary().robots_enabled
            && snapshot
                .summary()
                .warnings
                .iter()
                .any(|w| w.contains("robots.txt fetch failed"));
        if robots_missing {
            lists.warnings.push(json!({
                "check": "robots-txt",
                "message": "robots.txt could not be fetched during the crawl",
            }));
            findings.push(
                Finding::new(
                    snapshot.root_url().clone(),
                    "missing-robots-txt",
                    "robots.txt could not be fetched during the crawl",
                )
                .site_wide(),
            );
        }
        if !sitemap_referenced && !pages.is_empty() {
            lists.opportunities.push(json!({
                "check": "sitemap-reference",
                "message": "no page references sitemap.xml",
            }));
            findings.push(
                Finding::new(
                    snapshot.root_url().clone(),
                    "missing-sitemap-reference",
                    "no page references sitemap.xml",
                )
                .with_priority(IssuePriority::Low)
                .site_wide(),
            );
        }

        let score = lists.score();
        let mut status = status_from_findings(&findings);
        if score < config.fail_below {
            status = sitescope_types::TestStatus::Fail;
        }
        let summary = format!(
            "score {score}/10: {} critical, {} warnings, {} opportunities",
            lists.critical.len(),
            lists.warnings.len(),
            lists.opportunities.len()
        );
        let details = json!({
            "score": score,
            "pages_analyzed": pages.len(),
            "critical": lists.critical,
            "warnings": lists.warnings,
            "opportunities": lists.opportunities,
        });
        let info = self.describe();
        Ok(build_result(
            &info, snapshot, started_at, status, summary, details, findings,
        ))
    }
}
