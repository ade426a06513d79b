//! `sitescope crawl site ...`

use crate::error::ExitCode;
use crate::progress::spawn_renderer;
use clap::Subcommand;
use colored::Colorize;
use sitescope_engine::{Engine, EventSink};
use sitescope_types::{CrawlConfig, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum CrawlCommand {
    /// Crawl the project's site into a new immutable snapshot
    Site {
        /// Project slug (see `sitescope project list`)
        slug: String,

        /// Maximum pages to crawl (hard ceiling 10000)
        #[arg(long)]
        max_pages: Option<usize>,

        /// Maximum link depth from the root
        #[arg(long)]
        max_depth: Option<u32>,

        /// Only crawl paths matching these globs (repeatable)
        #[arg(long = "include")]
        include: Vec<String>,

        /// Skip paths matching these globs (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Ignore robots.txt (recorded in the snapshot summary)
        #[arg(long)]
        no_robots: bool,
    },
}

pub async fn run(engine: &Engine, command: CrawlCommand, quiet: bool) -> Result<ExitCode> {
    let CrawlCommand::Site {
        slug,
        max_pages,
        max_depth,
        include,
        exclude,
        no_robots,
    } = command;

    let mut config = CrawlConfig::default();
    if let Some(max_pages) = max_pages {
        config.max_pages = max_pages;
    }
    config.max_depth = max_depth;
    config.include_patterns = include;
    config.exclude_patterns = exclude;
    if no_robots {
        config.respect_robots = false;
    }

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted; sealing snapshot as partial...");
            ctrl_c_cancel.cancel();
        }
    });

    let (events, renderer) = if quiet {
        (EventSink::disabled(), None)
    } else {
        let (tx, rx) = mpsc::channel(256);
        (EventSink::new(tx), Some(spawn_renderer(rx)))
    };

    let (snapshot_id, summary) = engine.crawl_site(&slug, config, events, cancel).await?;
    if let Some(renderer) = renderer {
        let _ = renderer.await;
    }

    println!(
        "snapshot {} sealed as {} ({} pages, {} errors)",
        snapshot_id.bold(),
        summary.status.as_str(),
        summary.counts.pages,
        summary.counts.errors
    );
    for warning in &summary.warnings {
        println!("{} {warning}", "warning:".yellow());
    }
    if let Some(reason) = &summary.cancellation_reason {
        println!("{} {reason}", "stopped:".yellow());
    }
    Ok(ExitCode::Success)
}
