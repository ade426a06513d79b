//! Concurrent website crawler for sitescope.
//!
//! The crawl pipeline: the [`orchestrator`] drives a fixed worker pool over
//! the [`frontier`], consulting the [`robots`] policy and fetching through
//! the [`fetch`] layer; finished pages stream to the snapshot writer over a
//! bounded channel. The frontier's single-mutex enqueue/dequeue path makes
//! admission order deterministic given identical inputs and responses.

pub mod events;
pub mod fetch;
pub mod frontier;
pub mod orchestrator;
pub mod robots;
pub mod url_norm;

pub use events::{CrawlEvent, EventSink};
pub use fetch::{FetchError, FetchErrorKind, FetchOptions, FetchedPage, Fetcher, Renderer};
pub use frontier::{Frontier, SubmitOutcome};
pub use orchestrator::{CrawlOutcome, Crawler};
pub use robots::RobotsPolicy;
pub use url_norm::{collapse_slashes, normalize_url, registrable_domain, same_site};
