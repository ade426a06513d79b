//! Host-partitioned URL frontier.
//!
//! All enqueue/dequeue mutation happens under one mutex, which is what
//! makes admission order deterministic for identical inputs and responses.
//! Ordering is breadth-first globally and FIFO within a host; when several
//! hosts are eligible the one with the fewest in-flight requests wins, ties
//! broken by earliest enqueue.

use crate::url_norm::{normalize_url, same_site};
use glob::Pattern;
use sitescope_types::{CrawlConfig, EngineError};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};
use url::Url;

/// Ceiling for per-host exponential back-off.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Rolling window of recent fetch outcomes kept per host.
const SERVER_ERROR_WINDOW: usize = 10;
/// Minimum samples in the window before 5xx back-off can engage.
const SERVER_ERROR_MIN_SAMPLES: usize = 4;
/// 5xx fraction of the window at which back-off engages.
const SERVER_ERROR_THRESHOLD: f64 = 0.5;

/// What happened to a submitted URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Admitted,
    Duplicate,
    /// Rejected by site membership or include/exclude globs.
    Filtered,
    DepthExceeded,
    /// The `max_pages` admission ceiling was reached.
    CapReached,
    /// The frontier's in-memory ceiling was reached; enqueue is paused.
    BackPressure,
    Closed,
}

/// Result classification fed back after each fetch, for per-host pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    /// 429: back off immediately.
    RateLimited,
    /// 5xx: recorded in the host's rolling window; back-off engages only
    /// once the window's failure fraction crosses the sustained threshold.
    ServerError,
    /// Network-level failure; no back-off signal either way.
    Failure,
}

#[derive(Debug)]
struct HostQueue {
    queue: VecDeque<(Url, u32, u64)>,
    in_flight: usize,
    next_allowed_at: Option<Instant>,
    backoff: Duration,
    crawl_delay: Duration,
    /// Last [`SERVER_ERROR_WINDOW`] outcomes, `true` for a 5xx response.
    recent_outcomes: VecDeque<bool>,
}

impl HostQueue {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: 0,
            next_allowed_at: None,
            backoff: Duration::ZERO,
            crawl_delay: Duration::ZERO,
            recent_outcomes: VecDeque::with_capacity(SERVER_ERROR_WINDOW),
        }
    }

    fn ready_at(&self) -> Option<Instant> {
        self.next_allowed_at
    }

    fn is_ready(&self, now: Instant, per_host_concurrency: usize) -> bool {
        !self.queue.is_empty()
            && self.in_flight < per_host_concurrency
            && self.next_allowed_at.map_or(true, |at| at <= now)
    }

    fn record_outcome(&mut self, server_error: bool) {
        if self.recent_outcomes.len() == SERVER_ERROR_WINDOW {
            self.recent_outcomes.pop_front();
        }
        self.recent_outcomes.push_back(server_error);
    }

    /// Whether the window shows a sustained fraction of 5xx responses.
    fn server_errors_sustained(&self) -> bool {
        if self.recent_outcomes.len() < SERVER_ERROR_MIN_SAMPLES {
            return false;
        }
        let errors = self.recent_outcomes.iter().filter(|e| **e).count();
        errors as f64 / self.recent_outcomes.len() as f64 >= SERVER_ERROR_THRESHOLD
    }

    fn raise_backoff(&mut self) -> Duration {
        self.backoff = if self.backoff.is_zero() {
            Duration::from_secs(1)
        } else {
            (self.backoff * 2).min(MAX_BACKOFF)
        };
        let delay = self.backoff.max(self.crawl_delay);
        self.next_allowed_at = Some(Instant::now() + delay);
        delay
    }

    fn apply_crawl_delay(&mut self) {
        if !self.crawl_delay.is_zero() {
            self.next_allowed_at = Some(Instant::now() + self.crawl_delay);
        }
    }
}

#[derive(Debug, Default)]
struct FrontierState {
    hosts: BTreeMap<String, HostQueue>,
    seen: HashSet<String>,
    queued_total: usize,
    admitted_total: usize,
    in_flight_total: usize,
    dropped_by_cap: usize,
    backpressure_hit: bool,
    closed: bool,
    seq: u64,
}

/// Bounded, deduplicated queue of URLs the crawl will consider.
pub struct Frontier {
    root: Url,
    max_pages: usize,
    max_depth: Option<u32>,
    per_host_concurrency: usize,
    ceiling: usize,
    include_subdomains: bool,
    include_globs: Vec<Pattern>,
    exclude_globs: Vec<Pattern>,
    tracking_params: Vec<String>,
    state: Mutex<FrontierState>,
    notify: Notify,
}

impl Frontier {
    /// Build a frontier for one crawl. `root` must already be normalised.
    pub fn new(root: Url, config: &CrawlConfig) -> Result<Self, EngineError> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>, EngineError> {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| {
                        EngineError::invalid_config(format!("bad glob pattern {p:?}: {e}"))
                    })
                })
                .collect()
        };
        Ok(Self {
            root,
            max_pages: config.max_pages,
            max_depth: config.max_depth,
            per_host_concurrency: config.per_host_concurrency,
            ceiling: config.frontier_ceiling,
            include_subdomains: config.include_subdomains,
            include_globs: compile(&config.include_patterns)?,
            exclude_globs: compile(&config.exclude_patterns)?,
            tracking_params: config.tracking_params.clone(),
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
        })
    }

    /// Normalise and admit a URL at the given depth.
    pub async fn submit(&self, url: &Url, depth: u32) -> SubmitOutcome {
        let normalized = normalize_url(url, &self.tracking_params);

        if !same_site(&self.root, &normalized, self.include_subdomains) {
            return SubmitOutcome::Filtered;
        }
        if !self.path_admitted(normalized.path()) {
            return SubmitOutcome::Filtered;
        }
        if let Some(max_depth) = self.max_depth {
            if depth > max_depth {
                return SubmitOutcome::DepthExceeded;
            }
        }

        let key = normalized.to_string();
        let host = match normalized.host_str() {
            Some(host) => host.to_string(),
            None => return SubmitOutcome::Filtered,
        };

        let mut state = self.state.lock().await;
        if state.closed {
            return SubmitOutcome::Closed;
        }
        if state.seen.contains(&key) {
            return SubmitOutcome::Duplicate;
        }
        if state.admitted_total >= self.max_pages {
            state.dropped_by_cap += 1;
            return SubmitOutcome::CapReached;
        }
        if state.queued_total >= self.ceiling {
            if !state.backpressure_hit {
                warn!(
                    ceiling = self.ceiling,
                    "frontier ceiling reached; pausing enqueue"
                );
                state.backpressure_hit = true;
            }
            return SubmitOutcome::BackPressure;
        }

        state.seen.insert(key);
        state.admitted_total += 1;
        state.queued_total += 1;
        state.seq += 1;
        let seq = state.seq;
        state
            .hosts
            .entry(host)
            .or_insert_with(HostQueue::new)
            .queue
            .push_back((normalized.clone(), depth, seq));
        drop(state);

        debug!(url = %normalized, depth = depth, "admitted to frontier");
        self.notify.notify_waiters();
        SubmitOutcome::Admitted
    }

    /// Dequeue the next URL, waiting for per-host delays and completions.
    ///
    /// Returns `None` once the frontier is closed or drained with no
    /// requests in flight anywhere.
    pub async fn next(&self) -> Option<(Url, u32)> {
        loop {
            let wait_hint = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return None;
                }
                if let Some(item) = Self::pop_ready(&mut state, self.per_host_concurrency) {
                    return Some(item);
                }
                if state.queued_total == 0 && state.in_flight_total == 0 {
                    return None;
                }
                // Queued but not ready: either waiting out a delay or
                // waiting for an in-flight slot.
                let now = Instant::now();
                state
                    .hosts
                    .values()
                    .filter(|h| !h.queue.is_empty())
                    .filter_map(|h| h.ready_at())
                    .map(|at| at.saturating_duration_since(now))
                    .min()
            };

            // The sleep is capped so a notification raced between the
            // lock release and the select cannot stall a worker for the
            // whole back-off window.
            let sleep_for = wait_hint
                .unwrap_or(Duration::from_millis(50))
                .clamp(Duration::from_millis(5), Duration::from_secs(1));
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    fn pop_ready(state: &mut FrontierState, per_host_concurrency: usize) -> Option<(Url, u32)> {
        let now = Instant::now();
        // Fewest in-flight wins; ties break on the earliest-enqueued head.
        let best_host = state
            .hosts
            .iter()
            .filter(|(_, q)| q.is_ready(now, per_host_concurrency))
            .min_by_key(|(_, q)| (q.in_flight, q.queue.front().map(|(_, _, seq)| *seq)))
            .map(|(host, _)| host.clone())?;

        let queue = state.hosts.get_mut(&best_host)?;
        let (url, depth, _) = queue.queue.pop_front()?;
        queue.in_flight += 1;
        state.queued_total -= 1;
        state.in_flight_total += 1;
        Some((url, depth))
    }

    /// Record the result of a fetch for the URL's host: releases the
    /// in-flight slot and applies politeness/back-off scheduling.
    ///
    /// A 429 backs the host off immediately. A 5xx only feeds the host's
    /// rolling outcome window; back-off engages once the window shows a
    /// sustained 5xx fraction, and an isolated 5xx changes nothing.
    pub async fn complete(&self, url: &Url, outcome: RequestOutcome) {
        let Some(host) = url.host_str().map(str::to_string) else {
            return;
        };
        let mut state = self.state.lock().await;
        state.in_flight_total = state.in_flight_total.saturating_sub(1);
        if let Some(queue) = state.hosts.get_mut(&host) {
            queue.in_flight = queue.in_flight.saturating_sub(1);
            match outcome {
                RequestOutcome::Success => {
                    queue.record_outcome(false);
                    queue.backoff = Duration::ZERO;
                    queue.apply_crawl_delay();
                }
                RequestOutcome::Failure => {
                    queue.record_outcome(false);
                    queue.apply_crawl_delay();
                }
                RequestOutcome::RateLimited => {
                    let delay = queue.raise_backoff();
                    debug!(host = %host, backoff_ms = delay.as_millis() as u64, "rate limited; host backing off");
                }
                RequestOutcome::ServerError => {
                    queue.record_outcome(true);
                    if queue.server_errors_sustained() {
                        let delay = queue.raise_backoff();
                        debug!(host = %host, backoff_ms = delay.as_millis() as u64, "sustained 5xx; host backing off");
                    } else {
                        queue.apply_crawl_delay();
                    }
                }
            }
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Record the robots crawl-delay for a host. Idempotent.
    pub async fn set_crawl_delay(&self, host: &str, delay: Duration) {
        let mut state = self.state.lock().await;
        state
            .hosts
            .entry(host.to_string())
            .or_insert_with(HostQueue::new)
            .crawl_delay = delay;
    }

    /// Close the frontier: no further handouts or admissions.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        drop(state);
        self.notify.notify_waiters();
    }

    /// URLs admitted over the whole crawl so far.
    pub async fn admitted(&self) -> usize {
        self.state.lock().await.admitted_total
    }

    /// URLs still queued (used to distinguish drained from cut-short).
    pub async fn queued(&self) -> usize {
        self.state.lock().await.queued_total
    }

    /// Count of submissions dropped by the `max_pages` ceiling.
    pub async fn dropped_by_cap(&self) -> usize {
        self.state.lock().await.dropped_by_cap
    }

    /// Whether the in-memory ceiling was ever hit.
    pub async fn backpressure_hit(&self) -> bool {
        self.state.lock().await.backpressure_hit
    }

    fn path_admitted(&self, path: &str) -> bool {
        if self
            .exclude_globs
            .iter()
            .any(|pattern| pattern.matches(path))
        {
            return false;
        }
        if self.include_globs.is_empty() {
            return true;
        }
        self.include_globs
            .iter()
            .any(|pattern| pattern.matches(path))
    }
}
