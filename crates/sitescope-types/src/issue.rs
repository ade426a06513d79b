//! Tracked issues and their state machine.
//!
//! State machine: `open <-> investigating`, either of those -> `fixed`,
//! `fixed -> verified` by manual action, `fixed|verified -> open` only via
//! rediscovery. `verified` is the only manually reachable terminal state.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssuePriority {
    High,
    #[default]
    Medium,
    Low,
}

impl IssuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Investigating,
    Fixed,
    Verified,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Fixed => "fixed",
            Self::Verified => "verified",
        }
    }

    /// Whether the issue still counts toward the unique-fingerprint window.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Investigating)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "investigating" => Some(Self::Investigating),
            "fixed" => Some(Self::Fixed),
            "verified" => Some(Self::Verified),
            _ => None,
        }
    }
}

/// Check a *manual* transition for legality. Rediscovery re-opens are not
/// manual transitions and are applied by the tracker directly.
pub fn check_manual_transition(from: IssueStatus, to: IssueStatus) -> Result<(), EngineError> {
    use IssueStatus::*;
    let legal = matches!(
        (from, to),
        (Open, Investigating)
            | (Investigating, Open)
            | (Open, Fixed)
            | (Investigating, Fixed)
            | (Fixed, Verified)
    );
    if legal {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

/// One append-only history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTransition {
    pub from: Option<IssueStatus>,
    pub to: IssueStatus,
    pub at: DateTime<Utc>,
    /// `system` for tracker-driven transitions, otherwise the caller.
    pub actor: String,
}

/// A tracked problem, stable across runs via its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Project-scoped, zero-padded, never reused.
    pub id: String,
    pub plugin_name: String,
    /// `hash(plugin_name, category, normalised target)`.
    pub fingerprint: String,
    pub priority: IssuePriority,
    pub status: IssueStatus,
    pub title: String,
    pub affected_urls: Vec<Url>,
    pub first_detected_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Append-only, strictly time-ordered.
    pub history: Vec<IssueTransition>,
}

impl Issue {
    /// Append a transition and apply the new status.
    pub fn push_transition(&mut self, to: IssueStatus, actor: impl Into<String>) {
        self.history.push(IssueTransition {
            from: Some(self.status),
            to,
            at: Utc::now(),
            actor: actor.into(),
        });
        self.status = to;
    }
}

/// On-disk issue register, `issues.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueRegister {
    pub next_id: u64,
    pub issues: Vec<Issue>,
}

impl IssueRegister {
    /// Allocate the next zero-padded id. Ids are never reused, even after
    /// issue deletion.
    pub fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("ISS-{:04}", self.next_id)
    }

    pub fn find_active_by_fingerprint(&mut self, fingerprint: &str) -> Option<&mut Issue> {
        self.issues
            .iter_mut()
            .find(|i| i.fingerprint == fingerprint && i.status.is_active())
    }

    pub fn find_by_fingerprint(&mut self, fingerprint: &str) -> Option<&mut Issue> {
        self.issues.iter_mut().find(|i| i.fingerprint == fingerprint)
    }

    pub fn find_by_id(&mut self, id: &str) -> Option<&mut Issue> {
        self.issues.iter_mut().find(|i| i.id == id)
    }
}
