//! Project identity and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A tracked website under analysis.
///
/// The slug is derived from the root URL once at creation and stays stable
/// for the project's lifetime; it names the on-disk workspace directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub slug: String,
    pub root_url: Url,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Project {
    pub fn new(root_url: Url) -> Self {
        let now = Utc::now();
        Self {
            slug: slug_from_url(&root_url),
            root_url,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// Derive a filesystem-safe slug from a root URL.
///
/// Lowercased host plus path, every run of non-alphanumerics collapsed to a
/// single `-`, leading/trailing dashes trimmed.
pub fn slug_from_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or("site");
    let raw = format!("{}{}", host, url.path());
    slugify(&raw)
}

/// Collapse an arbitrary string into a slug of `[a-z0-9-]`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "site".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn slug_lowercases_and_collapses() {
        let url = Url::from_str("https://Docs.Example.COM/Guide/Intro/").expect("valid URL");
        assert_eq!(slug_from_url(&url), "docs-example-com-guide-intro");
    }

    #[test]
    fn slug_of_bare_host() {
        let url = Url::from_str("https://example.com/").expect("valid URL");
        assert_eq!(slug_from_url(&url), "example-com");
    }

    #[test]
    fn slugify_never_returns_empty() {
        assert_eq!(slugify("///"), "site");
        assert_eq!(slugify(""), "site");
    }

    #[test]
    fn slugify_collapses_runs() {
        assert_eq!(slugify("a--b__c  d"), "a-b-c-d");
    }
}
