//! Static analyzer registration.
//!
//! Analyzer identity is a value in this table, assembled at program start;
//! there is no import-time discovery.

use crate::example_bug::ExampleBugFinder;
use crate::llm::LlmAudit;
use crate::pattern_scan::PatternScan;
use crate::plugin::{Analyzer, AnalyzerInfo};
use crate::security::SecurityAudit;
use crate::seo::SeoAudit;
use sitescope_types::{EngineError, Result};
use std::sync::Arc;

/// The built-in analyzer set.
pub fn builtin_analyzers() -> Vec<Arc<dyn Analyzer>> {
    vec![
        Arc::new(PatternScan),
        Arc::new(SeoAudit),
        Arc::new(LlmAudit),
        Arc::new(SecurityAudit),
        Arc::new(ExampleBugFinder),
    ]
}

/// Holds the registered analyzers and resolves selections.
#[derive(Clone)]
pub struct PluginHost {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginHost {
    /// Host with the built-in table.
    pub fn new() -> Self {
        Self {
            analyzers: builtin_analyzers(),
        }
    }

    /// Register an additional analyzer (injected, not discovered).
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    pub fn list(&self) -> Vec<AnalyzerInfo> {
        self.analyzers.iter().map(|a| a.describe()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers
            .iter()
            .find(|a| a.describe().name == name)
            .cloned()
    }

    /// Resolve a selection in caller order; empty means all, in
    /// registration order. Unknown names fail before anything runs.
    pub fn resolve(&self, selection: &[String]) -> Result<Vec<Arc<dyn Analyzer>>> {
        if selection.is_empty() {
            return Ok(self.analyzers.clone());
        }
        selection
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| EngineError::not_found("plugin", name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_complete() {
        let host = PluginHost::new();
        let names: Vec<&str> = host.list().iter().map(|i| i.name).collect();
        assert_eq!(
            names,
            vec![
                "pattern-scan",
                "seo-audit",
                "llm-audit",
                "security-audit",
                "example-bug"
            ]
        );
    }

    #[test]
    fn resolution_preserves_caller_order() {
        let host = PluginHost::new();
        let selected = host
            .resolve(&["security-audit".to_string(), "pattern-scan".to_string()])
            .expect("resolves");
        assert_eq!(selected[0].describe().name, "security-audit");
        assert_eq!(selected[1].describe().name, "pattern-scan");
    }

    #[test]
    fn unknown_plugin_fails_resolution() {
        let host = PluginHost::new();
        let err = match host.resolve(&["no-such-plugin".to_string()]) {
            Ok(_) => panic!("unknown"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn every_analyzer_declares_a_schema() {
        for info in PluginHost::new().list() {
            assert!(!info.name.is_empty());
            assert!(!info.description.is_empty());
            // RootSchema serialises to a JSON object.
            let schema = serde_json::to_value(&info.config_schema).expect("schema serialises");
            assert!(schema.is_object());
        }
    }
}
