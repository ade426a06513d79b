//! `sitescope test ...`

use crate::error::ExitCode;
use crate::output::{issue_table, result_table, status_coloured};
use clap::Subcommand;
use colored::Colorize;
use sitescope_engine::Engine;
use sitescope_types::{EngineError, IssueStatus, Result, RunnerConfig, TestStatus};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum TestCommand {
    /// List the registered analyzers and their config schemas
    ListPlugins {
        /// Also print each analyzer's JSON config schema
        #[arg(long)]
        schemas: bool,
    },

    /// Run analyzers against a snapshot and update the issue register
    Run {
        /// Project slug
        slug: String,

        /// Analyzer to run (repeatable; default: all)
        #[arg(long = "test")]
        tests: Vec<String>,

        /// Snapshot timestamp (default: latest sealed)
        #[arg(long)]
        snapshot: Option<String>,

        /// Per-analyzer timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Per-analyzer config as NAME:JSON (repeatable)
        #[arg(long = "config")]
        configs: Vec<String>,
    },

    /// List tracked issues
    ViewIssues {
        /// Project slug
        slug: String,

        /// Filter by status (open|investigating|fixed|verified)
        #[arg(long)]
        status: Option<String>,

        /// Filter by plugin name
        #[arg(long)]
        plugin: Option<String>,
    },
}

pub async fn run(engine: &Engine, command: TestCommand, quiet: bool) -> Result<ExitCode> {
    match command {
        TestCommand::ListPlugins { schemas } => {
            for info in engine.list_plugins() {
                println!("{}  {}", info.name.bold(), info.description);
                if schemas {
                    let schema = serde_json::to_string_pretty(&info.config_schema)
                        .map_err(|e| EngineError::internal(format!("schema render: {e}")))?;
                    println!("{schema}");
                }
            }
            Ok(ExitCode::Success)
        }

        TestCommand::Run {
            slug,
            tests,
            snapshot,
            timeout,
            configs,
        } => {
            let configs = parse_configs(&configs)?;
            let mut runner_config = RunnerConfig::default();
            if let Some(secs) = timeout {
                runner_config.per_plugin_timeout = Duration::from_secs(secs);
            }

            let cancel = CancellationToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c_cancel.cancel();
                }
            });

            let (run, report) = engine
                .run_tests(
                    &slug,
                    snapshot.as_deref(),
                    &tests,
                    &configs,
                    runner_config,
                    cancel,
                )
                .await?;

            println!("{}", result_table(&run.results));
            if !quiet {
                for result in &run.results {
                    println!(
                        "{}: {} — {}",
                        result.plugin_name,
                        status_coloured(result.status),
                        result.summary
                    );
                }
            }
            if !report.is_noop() {
                println!(
                    "issues: {} opened, {} reopened, {} resolved",
                    report.opened.len(),
                    report.reopened.len(),
                    report.resolved.len()
                );
            }

            let failed = run
                .results
                .iter()
                .any(|r| matches!(r.status, TestStatus::Fail));
            if failed {
                Ok(ExitCode::Findings)
            } else {
                Ok(ExitCode::Success)
            }
        }

        TestCommand::ViewIssues {
            slug,
            status,
            plugin,
        } => {
            let status = match status.as_deref() {
                None => None,
                Some(raw) => Some(IssueStatus::parse(raw).ok_or_else(|| {
                    EngineError::usage(format!(
                        "unknown status {raw:?}; expected open|investigating|fixed|verified"
                    ))
                })?),
            };
            let issues = engine.list_issues(&slug, status, plugin.as_deref())?;
            if issues.is_empty() {
                println!("no issues match");
            } else {
                println!("{}", issue_table(&issues));
            }
            Ok(ExitCode::Success)
        }
    }
}

/// Parse repeated `NAME:JSON` config arguments.
fn parse_configs(raw: &[String]) -> Result<HashMap<String, serde_json::Value>> {
    let mut configs = HashMap::new();
    for entry in raw {
        let (name, json) = entry.split_once(':').ok_or_else(|| {
            EngineError::usage(format!("expected NAME:JSON, got {entry:?}"))
        })?;
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            EngineError::usage(format!("invalid JSON config for {name:?}: {e}"))
        })?;
        configs.insert(name.to_string(), value);
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_arguments_parse_name_and_json() {
        let configs = parse_configs(&[
            r#"pattern-scan:{"patterns":{"x":"y"}}"#.to_string(),
        ])
        .expect("parses");
        assert!(configs["pattern-scan"]["patterns"]["x"].is_string());
    }

    #[test]
    fn malformed_config_arguments_are_usage_errors() {
        assert!(parse_configs(&["no-colon-here".to_string()]).is_err());
        assert!(parse_configs(&["name:not-json".to_string()]).is_err());
    }
}
