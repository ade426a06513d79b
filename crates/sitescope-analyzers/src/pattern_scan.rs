//! Deprecated-pattern scanner.
//!
//! Scans every page's line-preserving text projection with a configured
//! map of named regexes and reports each match with its 1-based line
//! number and a 10-line context window.

use crate::context::{context_window, line_of_offset};
use crate::plugin::{build_result, parse_config, Analyzer, AnalyzerInfo};
use async_trait::async_trait;
use chrono::Utc;
use regex::RegexBuilder;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use sitescope_extraction::text_content;
use sitescope_store::Snapshot;
use sitescope_types::{EngineError, Finding, IssuePriority, Result, TestResult, TestStatus};
use std::collections::BTreeMap;

const CONTEXT_RADIUS: usize = 5;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PatternScanConfig {
    /// Named regexes to search for.
    #[serde(default)]
    pub patterns: BTreeMap<String, String>,
    /// Case-sensitive matching (default true).
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

impl Default for PatternScanConfig {
    fn default() -> Self {
        Self {
            patterns: BTreeMap::new(),
            case_sensitive: true,
        }
    }
}

fn default_case_sensitive() -> bool {
    true
}

pub struct PatternScan;

#[async_trait]
impl Analyzer for PatternScan {
    fn describe(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: "pattern-scan",
            description: "Search page text for configured deprecated patterns",
            config_schema: schemars::schema_for!(PatternScanConfig),
        }
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        config: &serde_json::Value,
    ) -> Result<TestResult> {
        let started_at = Utc::now();
        let config: PatternScanConfig = parse_config(config)?;
        if config.patterns.is_empty() {
            return Err(EngineError::invalid_config(
                "pattern-scan requires at least one pattern",
            ));
        }

        let mut compiled = BTreeMap::new();
        for (name, pattern) in &config.patterns {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(!config.case_sensitive)
                .build()
                .map_err(|e| {
                    EngineError::invalid_config(format!("pattern {name:?} is invalid: {e}"))
                })?;
            compiled.insert(name.clone(), regex);
        }

        let mut findings = Vec::new();
        let mut match_counts: BTreeMap<String, usize> = BTreeMap::new();
        let pages = snapshot.pages()?;
        for page in &pages {
            let text = text_content(&page.cleaned_html().await?);
            for (name, regex) in &compiled {
                for matched in regex.find_iter(&text) {
                    let line_number = line_of_offset(&text, matched.start());
                    *match_counts.entry(name.clone()).or_default() += 1;
                    findings.push(
                        Finding::new(
                            page.url().clone(),
                            name.clone(),
                            format!("deprecated pattern {name:?} found"),
                        )
                        .with_priority(IssuePriority::Medium)
                        .with_detail(json!({
                            "pattern": name,
                            "matched_text": matched.as_str(),
                            "line_number": line_number,
                            "context": context_window(&text, line_number, CONTEXT_RADIUS),
                        })),
                    );
                }
            }
        }

        let status = if findings.is_empty() {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        };
        let summary = if findings.is_empty() {
            format!("no matches across {} pages", pages.len())
        } else {
            format!("{} matches across {} pages", findings.len(), pages.len())
        };
        let details = json!({
            "pages_scanned": pages.len(),
            "total_matches": findings.len(),
            "matches_by_pattern": match_counts,
        });
        let info = self.describe();
        Ok(build_result(
            &info, snapshot, started_at, status, summary, details, findings,
        ))
    }
}
