//! Snapshot writer and reader.
//!
//! A snapshot directory is writable between `allocate` and `seal`; sealing
//! atomically renames the `.partial` marker to `.complete`, after which the
//! snapshot is immutable and any process may read it without coordination.

use sitescope_types::project::slugify;
use sitescope_types::snapshot::snapshot_id_from;
use sitescope_types::{
    CrawledPage, EngineError, PageRecord, Result, Sitemap, SitemapEntry, SnapshotId,
    SnapshotSummary,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

const PARTIAL_MARKER: &str = ".partial";
const COMPLETE_MARKER: &str = ".complete";
const MAX_SLUG_LEN: usize = 100;

/// Incremental writer for one snapshot.
pub struct SnapshotWriter {
    dir: PathBuf,
    id: SnapshotId,
    root: Url,
    used_slugs: HashSet<String>,
    crawled: Vec<SitemapEntry>,
    crawled_urls: HashSet<String>,
    discovered: Vec<SitemapEntry>,
    discovered_urls: HashSet<String>,
}

impl SnapshotWriter {
    /// Allocate a fresh snapshot directory under `snapshots_dir`.
    ///
    /// Same-second collisions get a `-2`, `-3`... suffix so ids stay unique
    /// and lexicographically ordered within the second.
    pub fn allocate(snapshots_dir: &Path, root: Url) -> Result<Self> {
        let base = snapshot_id_from(Utc::now());
        let mut id = base.clone();
        let mut attempt = 1usize;
        let dir = loop {
            let candidate = snapshots_dir.join(&id);
            match std::fs::create_dir_all(snapshots_dir)
                .and_then(|_| std::fs::create_dir(&candidate))
            {
                Ok(()) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    id = format!("{base}-{attempt}");
                }
                Err(e) => {
                    return Err(EngineError::resource_io(
                        "failed to allocate snapshot directory",
                        e,
                    ))
                }
            }
        };
        std::fs::create_dir_all(dir.join("pages"))?;
        std::fs::write(dir.join(PARTIAL_MARKER), b"")?;
        info!(snapshot = %id, "allocated snapshot");
        Ok(Self {
            dir,
            id,
            root,
            used_slugs: HashSet::new(),
            crawled: Vec::new(),
            crawled_urls: HashSet::new(),
            discovered: Vec::new(),
            discovered_urls: HashSet::new(),
        })
    }

    pub fn snapshot_id(&self) -> &SnapshotId {
        &self.id
    }

    pub fn pages_written(&self) -> usize {
        self.crawled.len()
    }

    /// Write one page's artefacts. Pages arrive in admission order over the
    /// crawl channel; the sitemap preserves that order.
    pub async fn write_page(&mut self, page: &CrawledPage) -> Result<()> {
        let slug = self.page_slug(&page.record.url);
        let page_dir = self.dir.join("pages").join(&slug);
        tokio::fs::create_dir_all(&page_dir).await?;

        tokio::fs::write(page_dir.join("raw.html"), &page.raw_html).await?;
        tokio::fs::write(page_dir.join("cleaned.html"), &page.cleaned_html).await?;
        tokio::fs::write(page_dir.join("content.md"), &page.markdown).await?;
        let meta = serde_json::to_string_pretty(&page.record)
            .map_err(|e| EngineError::internal(format!("page meta serialization: {e}")))?;
        tokio::fs::write(page_dir.join("meta.json"), meta).await?;

        let url_key = page.record.url.to_string();
        self.crawled.push(SitemapEntry {
            url: page.record.url.clone(),
            status: Some(page.record.http_status),
            depth: page.record.depth,
        });
        self.crawled_urls.insert(url_key);
        for link in &page.record.outbound_links {
            let key = link.to_string();
            if !self.crawled_urls.contains(&key) && self.discovered_urls.insert(key) {
                self.discovered.push(SitemapEntry {
                    url: link.clone(),
                    status: None,
                    depth: page.record.depth + 1,
                });
            }
        }

        debug!(url = %page.record.url, slug = %slug, "wrote page artefacts");
        Ok(())
    }

    /// Seal the snapshot: write the sitemap and summary, then atomically
    /// rename the `.partial` marker to `.complete`.
    pub async fn seal(self, mut summary: SnapshotSummary) -> Result<(SnapshotId, SnapshotSummary)> {
        summary.counts.pages = self.crawled.len();
        summary.counts.errors = summary.errors.len();

        let mut pages = self.crawled;
        let crawled_urls = self.crawled_urls;
        pages.extend(
            self.discovered
                .into_iter()
                .filter(|entry| !crawled_urls.contains(&entry.url.to_string())),
        );
        let sitemap = Sitemap {
            root: self.root,
            pages,
        };

        let sitemap_json = serde_json::to_string_pretty(&sitemap)
            .map_err(|e| EngineError::internal(format!("sitemap serialization: {e}")))?;
        tokio::fs::write(self.dir.join("sitemap.json"), sitemap_json).await?;
        let summary_json = serde_json::to_string_pretty(&summary)
            .map_err(|e| EngineError::internal(format!("summary serialization: {e}")))?;
        tokio::fs::write(self.dir.join("summary.json"), summary_json).await?;

        tokio::fs::rename(
            self.dir.join(PARTIAL_MARKER),
            self.dir.join(COMPLETE_MARKER),
        )
        .await?;
        info!(
            snapshot = %self.id,
            pages = summary.counts.pages,
            status = summary.status.as_str(),
            "sealed snapshot"
        );
        Ok((self.id, summary))
    }

    /// Filesystem-safe, unique subpath for a page URL.
    fn page_slug(&mut self, url: &Url) -> String {
        let host = url.host_str().unwrap_or("");
        let mut base = slugify(&format!("{}{}", host, url.path()));
        base.truncate(MAX_SLUG_LEN);
        let slug = if self.used_slugs.contains(&base) {
            let mut hasher = Sha256::new();
            hasher.update(url.as_str().as_bytes());
            let digest = hasher.finalize();
            format!("{base}-{:08x}", u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
        } else {
            base
        };
        self.used_slugs.insert(slug.clone());
        slug
    }
}

/// A sealed, read-only snapshot.
#[derive(Debug)]
pub struct Snapshot {
    dir: PathBuf,
    id: SnapshotId,
    summary: SnapshotSummary,
    sitemap: Sitemap,
}

impl Snapshot {
    /// Open a sealed snapshot. Directories without a `.complete` marker are
    /// in progress (or abandoned) and refuse to open.
    pub fn open(snapshots_dir: &Path, id: &str) -> Result<Self> {
        let dir = snapshots_dir.join(id);
        if !dir.is_dir() {
            return Err(EngineError::not_found("snapshot", id));
        }
        if !dir.join(COMPLETE_MARKER).is_file() {
            return Err(EngineError::not_found("sealed snapshot", id));
        }
        let summary: SnapshotSummary =
            serde_json::from_str(&std::fs::read_to_string(dir.join("summary.json"))?)
                .map_err(|e| EngineError::resource(format!("corrupt summary.json: {e}")))?;
        let sitemap: Sitemap =
            serde_json::from_str(&std::fs::read_to_string(dir.join("sitemap.json"))?)
                .map_err(|e| EngineError::resource(format!("corrupt sitemap.json: {e}")))?;
        Ok(Self {
            dir,
            id: id.to_string(),
            summary,
            sitemap,
        })
    }

    pub fn id(&self) -> &SnapshotId {
        &self.id
    }

    pub fn summary(&self) -> &SnapshotSummary {
        &self.summary
    }

    pub fn sitemap(&self) -> &Sitemap {
        &self.sitemap
    }

    pub fn root_url(&self) -> &Url {
        &self.sitemap.root
    }

    /// All crawled pages, in admission order.
    pub fn pages(&self) -> Result<Vec<PageHandle>> {
        let mut handles = Vec::new();
        let pages_dir = self.dir.join("pages");
        let entries = match std::fs::read_dir(&pages_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(handles),
        };
        for entry in entries.flatten() {
            let meta_path = entry.path().join("meta.json");
            if !meta_path.is_file() {
                continue;
            }
            let record: PageRecord = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)
                .map_err(|e| EngineError::resource(format!("corrupt page meta: {e}")))?;
            handles.push(PageHandle {
                dir: entry.path(),
                record,
            });
        }

        // Directory order is arbitrary; restore admission order from the
        // sitemap's crawled entries.
        let rank: HashMap<String, usize> = self
            .sitemap
            .pages
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.url.to_string(), index))
            .collect();
        handles.sort_by_key(|handle| {
            rank.get(&handle.record.url.to_string())
                .copied()
                .unwrap_or(usize::MAX)
        });
        Ok(handles)
    }
}

/// One crawled page inside a sealed snapshot; artefacts load lazily.
#[derive(Debug, Clone)]
pub struct PageHandle {
    dir: PathBuf,
    pub record: PageRecord,
}

impl PageHandle {
    pub fn url(&self) -> &Url {
        &self.record.url
    }

    pub async fn raw_html(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.dir.join("raw.html")).await?)
    }

    pub async fn cleaned_html(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.dir.join("cleaned.html")).await?)
    }

    pub async fn markdown(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.dir.join("content.md")).await?)
    }
}
