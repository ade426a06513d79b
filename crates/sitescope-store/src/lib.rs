//! On-disk state for sitescope: the project workspace layout, immutable
//! snapshots, append-only test results and the stateful issue register.
//!
//! Layout per project:
//!
//! ```text
//! <root>/projects/<slug>/
//!   metadata.json                 project attributes
//!   issues.json                   issue register
//!   snapshots/<ts>/               one immutable crawl snapshot
//!   test-results/<ts>.json        one file per test run
//! ```

pub mod issues;
pub mod results;
pub mod snapshot;
pub mod workspace;

pub use issues::{fingerprint, IssueTracker, PromotionReport};
pub use results::{ResultStore, RunDiff, StatusChange, TestRun};
pub use snapshot::{PageHandle, Snapshot, SnapshotWriter};
pub use workspace::{ProjectHandle, Workspace, WriterLock};
