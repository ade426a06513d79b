//! Analyzer plugins and the test runner.
//!
//! Analyzers are registered in a static table assembled at startup (no
//! import-time discovery); each exposes a description (name, summary and
//! config schema) and an execute method. The runner drives selected
//! analyzers sequentially over a sealed snapshot, enforcing per-plugin
//! timeouts and converting panics into error results.

pub mod context;
pub mod example_bug;
pub mod llm;
pub mod pattern_scan;
pub mod plugin;
pub mod registry;
pub mod runner;
pub mod security;
pub mod seo;

pub use plugin::{Analyzer, AnalyzerInfo};
pub use registry::PluginHost;
pub use runner::TestRunner;
