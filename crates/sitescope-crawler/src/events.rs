//! Typed crawl progress events.
//!
//! Events are emitted best-effort over a bounded channel; a slow or absent
//! consumer never stalls the crawl.

use sitescope_types::SnapshotStatus;
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Started {
        root: Url,
    },
    PageCrawled {
        url: Url,
        http_status: u16,
        depth: u32,
        pages_done: usize,
    },
    PageFailed {
        url: Url,
        kind: String,
        message: String,
    },
    Warning {
        message: String,
    },
    Finished {
        status: SnapshotStatus,
        pages: usize,
        errors: usize,
    },
}

/// Best-effort emitter around an optional channel.
#[derive(Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::Sender<CrawlEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::Sender<CrawlEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: CrawlEvent) {
        if let Some(sender) = &self.sender {
            // Dropped events are acceptable; progress display is advisory.
            let _ = sender.try_send(event);
        }
    }
}
