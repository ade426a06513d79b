//! Stateful issue register.
//!
//! Issues are derived from findings by fingerprint and tracked across test
//! runs: new fingerprints open issues, persisting ones refresh them, and a
//! fingerprint that fails to reappear for a plugin that actually ran is
//! auto-resolved. Reappearance after `fixed`/`verified` re-opens the issue
//! with its history intact.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sitescope_types::issue::check_manual_transition;
use sitescope_types::{
    EngineError, Issue, IssuePriority, IssueRegister, IssueStatus, IssueTransition, Result,
    TestResult, TestStatus,
};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info};
use url::Url;

/// Fingerprint target used when a finding is marked site-wide.
const SITE_WIDE_TARGET: &str = "site";

/// Stable fingerprint for a finding: the same problem at the same target
/// hashes identically across runs.
pub fn fingerprint(plugin_name: &str, category: &str, target: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plugin_name.as_bytes());
    hasher.update([0]);
    hasher.update(category.as_bytes());
    hasher.update([0]);
    hasher.update(target.as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// What one promotion pass did to the register.
#[derive(Debug, Clone, Default)]
pub struct PromotionReport {
    pub opened: Vec<String>,
    pub reopened: Vec<String>,
    pub resolved: Vec<String>,
    /// Issues that were already open and were seen again.
    pub refreshed: usize,
}

impl PromotionReport {
    pub fn is_noop(&self) -> bool {
        self.opened.is_empty() && self.reopened.is_empty() && self.resolved.is_empty()
    }
}

struct FindingGroup {
    plugin_name: String,
    title: String,
    priority: IssuePriority,
    urls: Vec<Url>,
}

/// Issue register persistence and transitions for one project.
#[derive(Debug, Clone)]
pub struct IssueTracker {
    path: PathBuf,
}

impl IssueTracker {
    pub fn new(issues_path: impl Into<PathBuf>) -> Self {
        Self {
            path: issues_path.into(),
        }
    }

    pub fn load(&self) -> Result<IssueRegister> {
        if !self.path.is_file() {
            return Ok(IssueRegister::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw)
            .map_err(|e| EngineError::resource(format!("corrupt issues.json: {e}")))
    }

    fn save(&self, register: &IssueRegister) -> Result<()> {
        let json = serde_json::to_string_pretty(register)
            .map_err(|e| EngineError::internal(format!("issue serialization: {e}")))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// List issues, optionally filtered by status and plugin.
    pub fn list(
        &self,
        status: Option<IssueStatus>,
        plugin: Option<&str>,
    ) -> Result<Vec<Issue>> {
        let register = self.load()?;
        Ok(register
            .issues
            .into_iter()
            .filter(|issue| status.map_or(true, |s| issue.status == s))
            .filter(|issue| plugin.map_or(true, |p| issue.plugin_name == p))
            .collect())
    }

    /// Apply a manual transition. Illegal moves fail without mutating state.
    pub fn transition(&self, id: &str, to: IssueStatus, actor: &str) -> Result<Issue> {
        let mut register = self.load()?;
        let issue = register
            .find_by_id(id)
            .ok_or_else(|| EngineError::not_found("issue", id))?;
        check_manual_transition(issue.status, to)?;
        issue.push_transition(to, actor);
        if to == IssueStatus::Fixed {
            issue.resolved_at = Some(Utc::now());
        }
        let updated = issue.clone();
        self.save(&register)?;
        info!(issue = %id, to = to.as_str(), actor = %actor, "issue transitioned");
        Ok(updated)
    }

    /// Fold a run's results into the register.
    ///
    /// Only plugins that actually produced a non-error result count as
    /// evidence of absence; an errored or unselected plugin leaves its
    /// issues untouched.
    pub fn promote(&self, results: &[TestResult]) -> Result<PromotionReport> {
        let ran: HashSet<&str> = results
            .iter()
            .filter(|r| r.status != TestStatus::Error)
            .map(|r| r.plugin_name.as_str())
            .collect();

        // Group findings by fingerprint so site-wide findings collapse and
        // multi-URL findings merge before promotion.
        let mut groups: BTreeMap<String, FindingGroup> = BTreeMap::new();
        for result in results {
            if result.status == TestStatus::Error {
                continue;
            }
            for finding in &result.findings {
                let target = if finding.site_wide {
                    SITE_WIDE_TARGET.to_string()
                } else {
                    finding.url.to_string()
                };
                let fp = fingerprint(&result.plugin_name, &finding.category, &target);
                let group = groups.entry(fp).or_insert_with(|| FindingGroup {
                    plugin_name: result.plugin_name.clone(),
                    title: finding.message.clone(),
                    priority: finding.priority,
                    urls: Vec::new(),
                });
                if !group.urls.contains(&finding.url) {
                    group.urls.push(finding.url.clone());
                }
                // High beats medium beats low.
                group.priority = group.priority.min(finding.priority);
            }
        }

        let mut register = self.load()?;
        let mut report = PromotionReport::default();
        let now = Utc::now();

        for (fp, group) in &groups {
            if let Some(issue) = register.find_active_by_fingerprint(fp) {
                issue.last_seen_at = now;
                for url in &group.urls {
                    if !issue.affected_urls.contains(url) {
                        issue.affected_urls.push(url.clone());
                    }
                }
                report.refreshed += 1;
                debug!(issue = %issue.id, fingerprint = %fp, "issue seen again");
            } else if let Some(issue) = register.find_by_fingerprint(fp) {
                // Rediscovery re-opens; first_detected_at is preserved.
                issue.push_transition(IssueStatus::Open, "system");
                issue.resolved_at = None;
                issue.last_seen_at = now;
                for url in &group.urls {
                    if !issue.affected_urls.contains(url) {
                        issue.affected_urls.push(url.clone());
                    }
                }
                report.reopened.push(issue.id.clone());
                info!(issue = %issue.id, fingerprint = %fp, "issue re-opened");
            } else {
                let id = register.allocate_id();
                register.issues.push(Issue {
                    id: id.clone(),
                    plugin_name: group.plugin_name.clone(),
                    fingerprint: fp.clone(),
                    priority: group.priority,
                    status: IssueStatus::Open,
                    title: group.title.clone(),
                    affected_urls: group.urls.clone(),
                    first_detected_at: now,
                    last_seen_at: now,
                    resolved_at: None,
                    history: vec![IssueTransition {
                        from: None,
                        to: IssueStatus::Open,
                        at: now,
                        actor: "system".to_string(),
                    }],
                });
                report.opened.push(id);
            }
        }

        // Absence is evidence only for plugins that ran successfully.
        for issue in register.issues.iter_mut() {
            if issue.status.is_active()
                && ran.contains(issue.plugin_name.as_str())
                && !groups.contains_key(&issue.fingerprint)
            {
                issue.push_transition(IssueStatus::Fixed, "system");
                issue.resolved_at = Some(now);
                report.resolved.push(issue.id.clone());
                info!(issue = %issue.id, "issue auto-resolved");
            }
        }

        self.save(&register)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitescope_types::Finding;
    use tempfile::TempDir;

    fn tracker() -> (TempDir, IssueTracker) {
        let tmp = TempDir::new().unwrap();
        let tracker = IssueTracker::new(tmp.path().join("issues.json"));
        (tmp, tracker)
    }

    fn result_with(findings: Vec<Finding>) -> TestResult {
        TestResult {
            plugin_name: "pattern-scan".to_string(),
            snapshot_id: "s".to_string(),
            started_at: Utc::now(),
            duration_ms: 1,
            status: if findings.is_empty() {
                TestStatus::Pass
            } else {
                TestStatus::Fail
            },
            summary: "r".to_string(),
            details: serde_json::Value::Null,
            findings,
        }
    }

    fn finding(url: &str, category: &str) -> Finding {
        Finding::new(Url::parse(url).unwrap(), category, "deprecated marker found")
    }

    #[test]
    fn fingerprints_are_stable_and_distinct() {
        let a = fingerprint("p", "c", "https://a.test/x");
        let b = fingerprint("p", "c", "https://a.test/x");
        let c = fingerprint("p", "c", "https://a.test/y");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(fingerprint("p", "c1", "t"), fingerprint("p", "c2", "t"));
    }

    #[test]
    fn new_findings_open_issues() {
        let (_tmp, tracker) = tracker();
        let report = tracker
            .promote(&[result_with(vec![finding("https://a.test/p", "legacy")])])
            .expect("promotes");
        assert_eq!(report.opened.len(), 1);

        let issues = tracker.list(None, None).expect("lists");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].status, IssueStatus::Open);
        assert_eq!(issues[0].id, "ISS-0001");
        assert_eq!(issues[0].history.len(), 1);
    }

    #[test]
    fn absence_auto_resolves_then_rediscovery_reopens() {
        let (_tmp, tracker) = tracker();

        // Run 1: one finding on /p.
        tracker
            .promote(&[result_with(vec![finding("https://a.test/p", "legacy")])])
            .unwrap();
        let first_detected = tracker.list(None, None).unwrap()[0].first_detected_at;

        // Run 2: plugin ran clean; the issue auto-resolves.
        let report = tracker.promote(&[result_with(vec![])]).unwrap();
        assert_eq!(report.resolved.len(), 1);
        let issue = &tracker.list(None, None).unwrap()[0];
        assert_eq!(issue.status, IssueStatus::Fixed);
        assert!(issue.resolved_at.is_some());
        assert_eq!(issue.history.len(), 2);

        // Run 3: the finding is back; fixed -> open, history grows,
        // first_detected_at survives.
        let report = tracker
            .promote(&[result_with(vec![finding("https://a.test/p", "legacy")])])
            .unwrap();
        assert_eq!(report.reopened.len(), 1);
        let issue = &tracker.list(None, None).unwrap()[0];
        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.resolved_at.is_none());
        assert_eq!(issue.history.len(), 3);
        assert_eq!(issue.first_detected_at, first_detected);
    }

    #[test]
    fn errored_plugins_leave_issues_untouched() {
        let (_tmp, tracker) = tracker();
        tracker
            .promote(&[result_with(vec![finding("https://a.test/p", "legacy")])])
            .unwrap();

        let errored = TestResult {
            status: TestStatus::Error,
            findings: Vec::new(),
            ..result_with(vec![])
        };
        let report = tracker.promote(&[errored]).unwrap();
        assert!(report.resolved.is_empty());
        assert_eq!(
            tracker.list(None, None).unwrap()[0].status,
            IssueStatus::Open
        );
    }

    #[test]
    fn repeat_promotion_is_a_noop_beyond_last_seen() {
        let (_tmp, tracker) = tracker();
        let findings = || vec![finding("https://a.test/p", "legacy")];
        tracker.promote(&[result_with(findings())]).unwrap();
        let before = tracker.load().unwrap();

        let report = tracker.promote(&[result_with(findings())]).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.refreshed, 1);

        let after = tracker.load().unwrap();
        assert_eq!(before.next_id, after.next_id);
        assert_eq!(before.issues.len(), after.issues.len());
        assert_eq!(before.issues[0].history.len(), after.issues[0].history.len());
        assert_eq!(before.issues[0].status, after.issues[0].status);
    }

    #[test]
    fn site_wide_findings_collapse_to_one_issue() {
        let (_tmp, tracker) = tracker();
        let findings = vec![
            finding("https://a.test/p", "missing-csp").site_wide(),
            finding("https://a.test/q", "missing-csp").site_wide(),
        ];
        let report = tracker.promote(&[result_with(findings)]).unwrap();
        assert_eq!(report.opened.len(), 1);

        let issues = tracker.list(None, None).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].affected_urls.len(), 2);
    }

    #[test]
    fn at_most_one_active_issue_per_fingerprint() {
        let (_tmp, tracker) = tracker();
        let findings = || vec![finding("https://a.test/p", "legacy")];
        tracker.promote(&[result_with(findings())]).unwrap();
        tracker.promote(&[result_with(findings())]).unwrap();
        tracker.promote(&[result_with(vec![])]).unwrap();
        tracker.promote(&[result_with(findings())]).unwrap();

        let register = tracker.load().unwrap();
        let active = register
            .issues
            .iter()
            .filter(|i| i.status.is_active())
            .count();
        assert_eq!(active, 1);
        assert_eq!(register.issues.len(), 1);
    }

    #[test]
    fn manual_transitions_enforce_legality() {
        let (_tmp, tracker) = tracker();
        tracker
            .promote(&[result_with(vec![finding("https://a.test/p", "legacy")])])
            .unwrap();

        let issue = tracker
            .transition("ISS-0001", IssueStatus::Investigating, "alice")
            .expect("open -> investigating");
        assert_eq!(issue.status, IssueStatus::Investigating);

        let err = tracker
            .transition("ISS-0001", IssueStatus::Verified, "alice")
            .expect_err("investigating -> verified is illegal");
        assert_eq!(err.kind(), "invalid_transition");

        // Failed transition did not mutate state.
        assert_eq!(
            tracker.list(None, None).unwrap()[0].status,
            IssueStatus::Investigating
        );

        tracker
            .transition("ISS-0001", IssueStatus::Fixed, "alice")
            .expect("investigating -> fixed");
        tracker
            .transition("ISS-0001", IssueStatus::Verified, "alice")
            .expect("fixed -> verified");
        let issue = &tracker.list(None, None).unwrap()[0];
        assert_eq!(issue.status, IssueStatus::Verified);
        assert_eq!(issue.history.len(), 4);
    }

    #[test]
    fn list_filters_by_status_and_plugin() {
        let (_tmp, tracker) = tracker();
        tracker
            .promote(&[result_with(vec![
                finding("https://a.test/p", "legacy"),
                finding("https://a.test/q", "other"),
            ])])
            .unwrap();
        tracker
            .transition("ISS-0001", IssueStatus::Investigating, "bob")
            .unwrap();

        let open = tracker.list(Some(IssueStatus::Open), None).unwrap();
        assert_eq!(open.len(), 1);
        let by_plugin = tracker.list(None, Some("pattern-scan")).unwrap();
        assert_eq!(by_plugin.len(), 2);
        let none = tracker.list(None, Some("seo-audit")).unwrap();
        assert!(none.is_empty());
    }
}
