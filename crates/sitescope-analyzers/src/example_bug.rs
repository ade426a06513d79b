//! Example-bug finder.
//!
//! Given a seed page known to display a rendering bug, extract the buggy
//! substring (or take it from config), derive a family of tolerant regexes
//! and report every page in the snapshot with structurally similar
//! occurrences. Precision over recall: a high-weight structural pattern
//! must match before the low-weight field-presence patterns count as
//! confirmation.

use crate::context::{context_window, line_of_offset};
use crate::plugin::{build_result, parse_config, Analyzer, AnalyzerInfo};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use sitescope_extraction::text_content;
use sitescope_store::Snapshot;
use sitescope_types::{EngineError, Finding, IssuePriority, Result, TestResult, TestStatus};
use std::collections::BTreeMap;
use tracing::debug;

/// The seven quote variants tolerated interchangeably.
const QUOTE_CLASS: &str = "[\"'`\u{2018}\u{2019}\u{201C}\u{201D}]";
/// Patterns at or above this weight are structural; at least one must
/// match for a page to be reported.
const STRUCTURAL_WEIGHT: f64 = 0.7;
const CONTEXT_RADIUS: usize = 5;
const MAX_FIELD_PATTERNS: usize = 4;

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExampleBugConfig {
    /// Page expected to display the bug. Must be part of the snapshot.
    pub seed_url: String,
    /// The buggy text itself; auto-extracted from the seed page when absent.
    #[serde(default)]
    pub bug_text: Option<String>,
}

/// One member of the derived pattern family.
pub struct BugPattern {
    pub name: String,
    pub regex: Regex,
    pub weight: f64,
}

impl BugPattern {
    pub fn is_structural(&self) -> bool {
        self.weight >= STRUCTURAL_WEIGHT
    }
}

pub struct ExampleBugFinder;

#[async_trait]
impl Analyzer for ExampleBugFinder {
    fn describe(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            name: "example-bug",
            description: "Find pages structurally similar to a seeded rendering bug",
            config_schema: schemars::schema_for!(ExampleBugConfig),
        }
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        config: &serde_json::Value,
    ) -> Result<TestResult> {
        let started_at = Utc::now();
        let config: ExampleBugConfig = parse_config(config)?;
        if config.seed_url.is_empty() {
            return Err(EngineError::invalid_config("example-bug requires seed_url"));
        }

        let pages = snapshot.pages()?;
        let seed_page = pages
            .iter()
            .find(|p| {
                p.url().as_str() == config.seed_url
                    || p.url().path() == config.seed_url
            })
            .ok_or_else(|| {
                EngineError::not_found("seed page in snapshot", &config.seed_url)
            })?;

        let seed_text = match &config.bug_text {
            Some(text) if !text.is_empty() => text.clone(),
            _ => {
                let text = text_content(&seed_page.cleaned_html().await?);
                auto_extract(&text).ok_or_else(|| {
                    EngineError::usage(
                        "could not auto-extract a bug pattern from the seed page; \
                         retry with an explicit bug_text",
                    )
                })?
            }
        };
        debug!(seed = %seed_text, "derived seed text");

        let family = generate_family(&seed_text)?;
        let mut findings = Vec::new();
        let mut pages_matched = 0usize;

        for page in &pages {
            let text = text_content(&page.cleaned_html().await?);
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            let mut first_structural: Option<usize> = None;
            for pattern in &family {
                let mut count = 0usize;
                for matched in pattern.regex.find_iter(&text) {
                    count += 1;
                    if pattern.is_structural() && first_structural.is_none() {
                        first_structural = Some(matched.start());
                    }
                }
                if count > 0 {
                    counts.insert(pattern.name.clone(), count);
                }
            }

            // Field-presence hits alone are not evidence.
            let Some(offset) = first_structural else {
                continue;
            };
            pages_matched += 1;
            let line_number = line_of_offset(&text, offset);
            findings.push(
                Finding::new(
                    page.url().clone(),
                    "example-bug",
                    "page shows content matching the seeded bug pattern",
                )
                .with_priority(IssuePriority::High)
                .with_detail(json!({
                    "match_counts": counts,
                    "line_number": line_number,
                    "context": context_window(&text, line_number, CONTEXT_RADIUS),
                })),
            );
        }

        let status = if findings.is_empty() {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        };
        let summary = format!(
            "{pages_matched} of {} pages match the seeded pattern",
            pages.len()
        );
        let details = json!({
            "seed_url": seed_page.url().as_str(),
            "seed_text": seed_text,
            "patterns": family
                .iter()
                .map(|p| json!({"name": p.name, "regex": p.regex.as_str(), "weight": p.weight}))
                .collect::<Vec<_>>(),
            "pages_matched": pages_matched,
            "pages_scanned": pages.len(),
        });
        let info = self.describe();
        Ok(build_result(
            &info, snapshot, started_at, status, summary, details, findings,
        ))
    }
}

/// Try the auto-extraction tiers in order, stopping at the first success.
pub fn auto_extract(text: &str) -> Option<String> {
    let tiers: [&str; 4] = [
        // 1. Double-bracket template constructs.
        r"(?s)\[\[.{1,400}?\]\]|\{\{.{1,400}?\}\}",
        // 2. JSON-looking substrings in visible text.
        r#"(?s)\{\s*"[A-Za-z0-9_]+"\s*:.{1,300}?\}"#,
        // 3. Percent-encoded HTML leaking into text.
        r"(?i)\S*(?:%3C|%3E|%7B|%7D|%5B|%5D|%22)\S*",
        // 4. Anomalously long unbroken tokens.
        r"[^\s<>]{41,}",
    ];
    for tier in tiers {
        let regex = Regex::new(tier).expect("tier patterns are static and valid");
        if let Some(matched) = regex.find(text) {
            return Some(matched.as_str().to_string());
        }
    }
    None
}

/// Derive the tolerant pattern family from the seed text.
pub fn generate_family(seed: &str) -> Result<Vec<BugPattern>> {
    let mut specs: Vec<(String, String, f64)> = Vec::new();

    specs.push(("exact".to_string(), regex::escape(seed), 1.0));
    specs.push(("quote-tolerant".to_string(), quote_tolerant(seed), 0.9));

    let (opening, closing) = structural_affixes(seed);
    let fields = field_names(seed);

    if opening.len() >= 2 {
        if let Some(first_field) = fields.first() {
            specs.push((
                "opening".to_string(),
                format!(
                    "(?s){}\\s*{}?{}{}?\\s*:",
                    join_flexible(&opening),
                    QUOTE_CLASS,
                    regex::escape(first_field),
                    QUOTE_CLASS
                ),
                0.85,
            ));
        }
    }
    if opening.len() >= 2 && closing.len() >= 2 {
        specs.push((
            "structure".to_string(),
            format!(
                "(?s){}.{{0,400}}?{}",
                join_flexible(&opening),
                join_flexible(&closing)
            ),
            0.8,
        ));
        specs.push((
            "structure-loose".to_string(),
            format!(
                "(?s){}.{{0,1000}}?{}",
                join_flexible(&opening),
                join_flexible(&closing)
            ),
            0.7,
        ));
    }

    for field in fields.iter().take(MAX_FIELD_PATTERNS) {
        if specs.len() >= 8 {
            break;
        }
        specs.push((
            format!("field-{field}"),
            format!(
                "{q}?{name}{q}?\\s*:\\s*{q}?[^\"'`\u{2018}\u{2019}\u{201C}\u{201D},\\}}\\]]{{1,200}}",
                q = QUOTE_CLASS,
                name = regex::escape(field)
            ),
            0.5,
        ));
    }

    let mut family = Vec::with_capacity(specs.len());
    for (name, pattern, weight) in specs {
        let regex = Regex::new(&pattern).map_err(|e| {
            EngineError::internal(format!("derived pattern {name:?} failed to compile: {e}"))
        })?;
        family.push(BugPattern {
            name,
            regex,
            weight,
        });
    }
    Ok(family)
}

/// Escape the seed, replacing quotes with the tolerance class and making
/// whitespace around separators flexible.
fn quote_tolerant(seed: &str) -> String {
    let mut out = String::with_capacity(seed.len() * 2);
    for ch in seed.chars() {
        match ch {
            '"' | '\'' | '`' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' => {
                out.push_str(QUOTE_CLASS)
            }
            ':' => out.push_str("\\s*:\\s*"),
            ',' => out.push_str("\\s*,\\s*"),
            c if c.is_whitespace() => out.push_str("\\s*"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out
}

/// Leading and trailing runs of structural brackets, whitespace ignored.
fn structural_affixes(seed: &str) -> (Vec<char>, Vec<char>) {
    let opening: Vec<char> = seed
        .chars()
        .take_while(|c| "[{(<".contains(*c) || c.is_whitespace())
        .filter(|c| !c.is_whitespace())
        .collect();
    let closing: Vec<char> = seed
        .chars()
        .rev()
        .take_while(|c| "]})>".contains(*c) || c.is_whitespace())
        .filter(|c| !c.is_whitespace())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    (opening, closing)
}

/// Join structural chars with flexible whitespace between them.
fn join_flexible(chars: &[char]) -> String {
    chars
        .iter()
        .map(|c| regex::escape(&c.to_string()))
        .collect::<Vec<_>>()
        .join("\\s*")
}

/// Field names appearing as `name:` or `"name":` in the seed.
fn field_names(seed: &str) -> Vec<String> {
    let regex = Regex::new(
        "[\"'`\u{2018}\u{2019}\u{201C}\u{201D}]?([A-Za-z0-9_]{2,})[\"'`\u{2018}\u{2019}\u{201C}\u{201D}]?\\s*:",
    )
    .expect("static pattern");
    let mut names = Vec::new();
    for cap in regex.captures_iter(seed) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
