//! Table and status rendering helpers.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use sitescope_types::{Issue, Project, TestResult, TestStatus};

pub fn status_coloured(status: TestStatus) -> String {
    match status {
        TestStatus::Pass => "pass".green().to_string(),
        TestStatus::Warning => "warning".yellow().to_string(),
        TestStatus::Fail => "fail".red().to_string(),
        TestStatus::Error => "error".red().bold().to_string(),
    }
}

pub fn project_table(projects: &[Project]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["slug", "root url", "created", "updated"]);
    for project in projects {
        table.add_row(vec![
            project.slug.clone(),
            project.root_url.to_string(),
            project.created_at.format("%Y-%m-%d %H:%M").to_string(),
            project.last_updated.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    table
}

pub fn result_table(results: &[TestResult]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["plugin", "status", "findings", "summary"]);
    for result in results {
        table.add_row(vec![
            result.plugin_name.clone(),
            status_coloured(result.status),
            result.findings.len().to_string(),
            result.summary.clone(),
        ]);
    }
    table
}

pub fn issue_table(issues: &[Issue]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "id", "status", "priority", "plugin", "title", "urls", "last seen",
    ]);
    for issue in issues {
        table.add_row(vec![
            issue.id.clone(),
            issue.status.as_str().to_string(),
            issue.priority.as_str().to_string(),
            issue.plugin_name.clone(),
            truncate(&issue.title, 60),
            issue.affected_urls.len().to_string(),
            issue.last_seen_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    table
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
