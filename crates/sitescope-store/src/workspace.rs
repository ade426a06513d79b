//! Workspace root and project lifecycle.

use fs2::FileExt;
use sitescope_types::{slug_from_url, EngineError, Project, Result, SnapshotId};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

const METADATA_FILE: &str = "metadata.json";
const LOCK_FILE: &str = ".writer.lock";

/// The workspace root holding all projects.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (creating if needed) a workspace rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("projects"))
            .map_err(|e| EngineError::resource_io("failed to create workspace root", e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    /// Create a new project for `url`. Fails if the slug already exists.
    pub fn create_project(&self, url: &Url) -> Result<ProjectHandle> {
        let project = Project::new(url.clone());
        let dir = self.projects_dir().join(&project.slug);
        if dir.exists() {
            return Err(EngineError::usage(format!(
                "project {:?} already exists",
                project.slug
            )));
        }
        fs::create_dir_all(dir.join("snapshots"))?;
        fs::create_dir_all(dir.join("test-results"))?;
        let handle = ProjectHandle { dir, project };
        handle.save_metadata()?;
        info!(slug = %handle.project.slug, url = %url, "created project");
        Ok(handle)
    }

    /// Open an existing project by slug.
    pub fn open_project(&self, slug: &str) -> Result<ProjectHandle> {
        let dir = self.projects_dir().join(slug);
        let metadata = dir.join(METADATA_FILE);
        if !metadata.is_file() {
            return Err(EngineError::not_found("project", slug));
        }
        let raw = fs::read_to_string(&metadata)?;
        let project: Project = serde_json::from_str(&raw)
            .map_err(|e| EngineError::resource(format!("corrupt metadata for {slug:?}: {e}")))?;
        Ok(ProjectHandle { dir, project })
    }

    /// List all projects, sorted by slug.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        let entries = match fs::read_dir(self.projects_dir()) {
            Ok(entries) => entries,
            Err(_) => return Ok(projects),
        };
        for entry in entries.flatten() {
            let metadata = entry.path().join(METADATA_FILE);
            if !metadata.is_file() {
                continue;
            }
            let raw = fs::read_to_string(&metadata)?;
            if let Ok(project) = serde_json::from_str::<Project>(&raw) {
                projects.push(project);
            }
        }
        projects.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(projects)
    }

    /// Slug a URL would map to, without creating anything.
    pub fn slug_for(url: &Url) -> String {
        slug_from_url(url)
    }
}

/// An opened project directory.
#[derive(Debug)]
pub struct ProjectHandle {
    dir: PathBuf,
    project: Project,
}

impl ProjectHandle {
    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn slug(&self) -> &str {
        &self.project.slug
    }

    pub fn root_url(&self) -> &Url {
        &self.project.root_url
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.dir.join("snapshots")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.join("test-results")
    }

    pub fn issues_path(&self) -> PathBuf {
        self.dir.join("issues.json")
    }

    /// Persist metadata, bumping `last_updated`.
    pub fn touch(&mut self) -> Result<()> {
        self.project.touch();
        self.save_metadata()
    }

    fn save_metadata(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.project)
            .map_err(|e| EngineError::internal(format!("metadata serialization failed: {e}")))?;
        fs::write(self.dir.join(METADATA_FILE), raw)?;
        Ok(())
    }

    /// List sealed snapshot ids in ascending (chronological) order.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        let mut ids = Vec::new();
        let entries = match fs::read_dir(self.snapshots_dir()) {
            Ok(entries) => entries,
            Err(_) => return Ok(ids),
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            // Snapshots without a .complete marker are in progress or
            // abandoned; readers ignore them.
            if entry.path().join(".complete").is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// The most recent sealed snapshot, if any.
    pub fn latest_snapshot(&self) -> Result<Option<SnapshotId>> {
        Ok(self.list_snapshots()?.pop())
    }

    /// Delete one snapshot wholesale. Results referencing it stay valid;
    /// they hold the id only.
    pub fn delete_snapshot(&self, id: &str) -> Result<()> {
        let dir = self.snapshots_dir().join(id);
        if !dir.is_dir() {
            return Err(EngineError::not_found("snapshot", id));
        }
        fs::remove_dir_all(&dir)?;
        info!(slug = %self.project.slug, snapshot = %id, "deleted snapshot");
        Ok(())
    }

    /// Take the advisory per-project writer lock. At most one writer per
    /// project at a time; readers are unrestricted.
    pub fn lock_writer(&self) -> Result<WriterLock> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| EngineError::resource_io("failed to open writer lock", e))?;
        file.try_lock_exclusive().map_err(|_| {
            EngineError::resource(format!(
                "project {:?} is locked by another writer",
                self.project.slug
            ))
        })?;
        debug!(slug = %self.project.slug, "acquired writer lock");
        Ok(WriterLock { file })
    }
}

/// Held for the duration of a mutating operation; released on drop.
#[derive(Debug)]
pub struct WriterLock {
    file: File,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().expect("tempdir");
        let ws = Workspace::open(dir.path()).expect("workspace opens");
        (dir, ws)
    }

    #[test]
    fn create_open_and_list_projects() {
        let (_dir, ws) = workspace();
        let url = Url::parse("https://example.com/").unwrap();
        let created = ws.create_project(&url).expect("creates");
        assert_eq!(created.slug(), "example-com");

        let opened = ws.open_project("example-com").expect("opens");
        assert_eq!(opened.root_url().as_str(), "https://example.com/");

        let listed = ws.list_projects().expect("lists");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].slug, "example-com");
    }

    #[test]
    fn duplicate_create_is_a_usage_error() {
        let (_dir, ws) = workspace();
        let url = Url::parse("https://example.com/").unwrap();
        ws.create_project(&url).expect("first create");
        let err = ws.create_project(&url).expect_err("second create fails");
        assert_eq!(err.kind(), "usage");
    }

    #[test]
    fn unknown_project_is_not_found() {
        let (_dir, ws) = workspace();
        let err = ws.open_project("nope").expect_err("missing");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn writer_lock_is_exclusive() {
        let (_dir, ws) = workspace();
        let url = Url::parse("https://example.com/").unwrap();
        let handle = ws.create_project(&url).expect("creates");

        let lock = handle.lock_writer().expect("first lock");
        let second = handle.lock_writer();
        assert!(second.is_err());
        drop(lock);
        handle.lock_writer().expect("relock after release");
    }

    #[test]
    fn snapshot_listing_ignores_unsealed_dirs() {
        let (_dir, ws) = workspace();
        let url = Url::parse("https://example.com/").unwrap();
        let handle = ws.create_project(&url).expect("creates");

        let sealed = handle.snapshots_dir().join("20250101000000");
        let unsealed = handle.snapshots_dir().join("20250102000000");
        fs::create_dir_all(&sealed).unwrap();
        fs::create_dir_all(&unsealed).unwrap();
        fs::write(sealed.join(".complete"), "").unwrap();
        fs::write(unsealed.join(".partial"), "").unwrap();

        let ids = handle.list_snapshots().expect("lists");
        assert_eq!(ids, vec!["20250101000000".to_string()]);
        assert_eq!(
            handle.latest_snapshot().expect("latest"),
            Some("20250101000000".to_string())
        );
    }
}
