//! LLM-discoverability audit.
//!
//! Scores how usable each page is for retrieval-augmented assistants.
//! Per-page deductions from 10: missing or thin meta description -2.5, no
//! JSON-LD structured data -2.5, broken heading hierarchy -2.0, under ~200
//! substantive words -3.0. The site score is the mean page score.

use crate::plugin::{build_result, parse_config, Analyzer, AnalyzerInfo};
use async_trait::async_trait;
use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use sitescope_extraction::PageDocument;
use sitescope_store::Snapshot;
use sitescope_types::{Finding, IssuePriority, Result, TestResult, TestStatus};

const DESCRIPTION_MIN: usize = 50;
const WORD_COUNT_MIN: usize = 200;

const DEDUCT_DESCRIPTION: f64 = 2.5;
const DEDUCT_JSON_LD: f64 = 2.5;
const DEDUCT_HEADINGS: f64 = 2.0;
const DEDUCT_THIN_CONTENT: f64 = 3.0;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Minimum substantive word count per page.
    #[serde(default = "default_min_words")]
    pub min_word_count: usize,
    /// Fail the run when the site score drops below this threshold.
    #[serde(default = "default_fail_below")]
    pub fail_below: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            min_word_count: default_min_words(),
            fail_below: default_fail_below(),
        }
    }
}

fn default_min_words() -> usize {
    WORD_COUNT_MIN
}

fn default_fail_below() -> f64 {
    4.0
}

pub struct LlmAudit;

#[async_trait]
impl Analyzer for LlmAudit {
    fn describe(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: "llm-audit",
            description: "LLM-discoverability checks: descriptions, JSON-LD, hierarchy, depth",
            config_schema: schemars::schema_for!(LlmConfig),
        }
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        config: &serde_json::Value,
    ) -> Result<TestResult> {
        let started_at = Utc::now();
        let config: LlmConfig = parse_config(config)?;

        let mut findings = Vec::new();
        let mut page_reports = Vec::new();
        let mut score_sum = 0.0;

        let pages = snapshot.pages()?;
        for page in &pages {
            let raw = page.raw_html().await?;
            let doc = PageDocument::parse(&raw);
            let mut deductions: Vec<(&str, f64)> = Vec::new();

            let description_ok = doc
                .meta_description
                .as_ref()
                .map(|d| d.chars().count() >= DESCRIPTION_MIN)
                .unwrap_or(false);
            if !description_ok {
                deductions.push(("weak-description", DEDUCT_DESCRIPTION));
                findings.push(Finding::new(
                    page.url().clone(),
                    "weak-description",
                    "meta description missing or too short for answer snippets",
                ));
            }

            if doc.json_ld.is_empty() {
                deductions.push(("no-structured-data", DEDUCT_JSON_LD));
                findings.push(Finding::new(
                    page.url().clone(),
                    "no-structured-data",
                    "no JSON-LD structured data block",
                ));
            }

            let hierarchy_ok = doc.h1_count() >= 1 && doc.headings_monotonic();
            if !hierarchy_ok {
                deductions.push(("heading-hierarchy", DEDUCT_HEADINGS));
                findings.push(Finding::new(
                    page.url().clone(),
                    "heading-hierarchy",
                    "missing H1 or skipped heading levels",
                ));
            }

            if doc.word_count < config.min_word_count {
                deductions.push(("thin-content", DEDUCT_THIN_CONTENT));
                findings.push(
                    Finding::new(
                        page.url().clone(),
                        "thin-content",
                        format!(
                            "only {} substantive words (minimum {})",
                            doc.word_count, config.min_word_count
                        ),
                    )
                    .with_priority(IssuePriority::Low),
                );
            }

            let page_score = (10.0 - deductions.iter().map(|(_, d)| d).sum::<f64>()).max(0.0);
            score_sum += page_score;
            page_reports.push(json!({
                "url": page.url().as_str(),
                "score": (page_score * 10.0).round() / 10.0,
                "deductions": deductions
                    .iter()
                    .map(|(name, value)| json!({"check": name, "deduction": value}))
                    .collect::<Vec<_>>(),
                "word_count": doc.word_count,
            }));
        }

        let site_score = if pages.is_empty() {
            10.0
        } else {
            ((score_sum / pages.len() as f64) * 10.0).round() / 10.0
        };
        let status = if site_score < config.fail_below {
            TestStatus::Fail
        } else if findings.is_empty() {
            TestStatus::Pass
        } else {
            TestStatus::Warning
        };
        let summary = format!(
            "site score {site_score}/10 across {} pages, {} findings",
            pages.len(),
            findings.len()
        );
        let details = json!({
            "score": site_score,
            "pages_analyzed": pages.len(),
            "pages": page_reports,
        });
        let info = self.describe();
        Ok(build_result(
            &info, snapshot, started_at, status, summary, details, findings,
        ))
    }
}
