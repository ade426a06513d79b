//! Crawl progress rendering over the engine's event stream.

use indicatif::{ProgressBar, ProgressStyle};
use sitescope_engine::CrawlEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spawn a renderer over a crawl event channel. Returns the receiver task;
/// await it after the crawl to flush the final line.
pub fn spawn_renderer(mut events: mpsc::Receiver<CrawlEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .expect("static template is valid"),
        );
        while let Some(event) = events.recv().await {
            match event {
                CrawlEvent::Started { root } => {
                    bar.set_message(format!("crawling {root}"));
                }
                CrawlEvent::PageCrawled {
                    url, pages_done, ..
                } => {
                    bar.set_message(format!("{pages_done} pages — {url}"));
                    bar.tick();
                }
                CrawlEvent::PageFailed { url, kind, .. } => {
                    bar.set_message(format!("{kind} on {url}"));
                    bar.tick();
                }
                CrawlEvent::Warning { message } => {
                    bar.println(format!("warning: {message}"));
                }
                CrawlEvent::Finished {
                    status,
                    pages,
                    errors,
                } => {
                    bar.finish_with_message(format!(
                        "done: {pages} pages, {errors} errors ({})",
                        status.as_str()
                    ));
                }
            }
        }
    })
}
