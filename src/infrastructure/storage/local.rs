use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{info, warn};

pub const ARCHIVE_SUFFIX: &str = ".zip";
const PARTIAL_SUFFIX: &str = ".zip.part";
pub const MANIFEST_NAME: &str = "index.m3u8";

/// An archive found in the archive store.
#[derive(Debug, Clone)]
pub struct StoredArchive {
    pub job_id: String,
    pub path: PathBuf,
    pub created_at: SystemTime,
}

/// A job working directory found in the output store.
#[derive(Debug, Clone)]
pub struct StoredWorkDir {
    pub job_id: String,
    pub path: PathBuf,
    pub modified_at: SystemTime,
}

/// Filesystem layout shared by every stage: a flat upload holding area, a
/// working-directory store keyed by job id and an archive store keyed by job
/// id with a fixed suffix.
#[derive(Clone, Debug)]
pub struct StorageService {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
}

impl StorageService {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
            archive_dir: archive_dir.into(),
        }
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.upload_dir, &self.output_dir, &self.archive_dir] {
            fs::create_dir_all(dir).await?;
        }
        info!(
            uploads = %self.upload_dir.display(),
            outputs = %self.output_dir.display(),
            archives = %self.archive_dir.display(),
            "✅ Storage directories ready"
        );
        Ok(())
    }

    pub fn work_dir(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(job_id)
    }

    pub fn archive_path(&self, job_id: &str) -> PathBuf {
        self.archive_dir.join(format!("{}{}", job_id, ARCHIVE_SUFFIX))
    }

    pub fn partial_archive_path(&self, job_id: &str) -> PathBuf {
        self.archive_dir.join(format!("{}{}", job_id, PARTIAL_SUFFIX))
    }

    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.upload_dir.join(file_name)
    }

    pub async fn work_dir_exists(&self, job_id: &str) -> std::io::Result<bool> {
        fs::try_exists(self.work_dir(job_id)).await
    }

    /// Uploads are stored as `<stem>_<job id>.<ext>`, so the job id alone is
    /// enough to find one again.
    pub async fn find_upload(&self, job_id: &str) -> std::io::Result<Option<PathBuf>> {
        let suffix = format!("_{}", job_id);
        let mut entries = match fs::read_dir(&self.upload_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.ends_with(&suffix));
            if matches {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Completed archives only; `.zip.part` files still being written are
    /// skipped, as is any entry whose metadata cannot be read.
    pub async fn list_archives(&self) -> std::io::Result<Vec<StoredArchive>> {
        let mut archives = Vec::new();
        let mut entries = fs::read_dir(&self.archive_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(job_id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(ARCHIVE_SUFFIX))
                .map(str::to_string)
            else {
                continue;
            };

            let Some(created_at) = modified_at(&path, entry.metadata().await, false) else {
                continue;
            };
            archives.push(StoredArchive { job_id, path, created_at });
        }
        Ok(archives)
    }

    /// Job working directories with their last modification time.
    pub async fn list_work_dirs(&self) -> std::io::Result<Vec<StoredWorkDir>> {
        let mut dirs = Vec::new();
        let mut entries = fs::read_dir(&self.output_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(job_id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let Some(modified) = modified_at(&path, entry.metadata().await, true) else {
                continue;
            };
            dirs.push(StoredWorkDir {
                job_id,
                path,
                modified_at: modified,
            });
        }
        Ok(dirs)
    }

    pub async fn archive_created_at(&self, job_id: &str) -> std::io::Result<Option<SystemTime>> {
        match fs::metadata(self.archive_path(job_id)).await {
            Ok(m) => Ok(Some(m.modified()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Modification time of a listed entry of the expected kind. Entries that
/// vanished, have the wrong kind or whose metadata cannot be read yield
/// `None`; unreadable ones are logged.
fn modified_at(path: &Path, metadata: std::io::Result<Metadata>, want_dir: bool) -> Option<SystemTime> {
    let metadata = match metadata {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            return None;
        }
    };
    let kind_matches = if want_dir { metadata.is_dir() } else { metadata.is_file() };
    if !kind_matches {
        return None;
    }
    match metadata.modified() {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("Skipping {}, no modification time: {}", path.display(), e);
            None
        }
    }
}

/// Returns `Ok(false)` when there was nothing to remove.
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Returns `Ok(false)` when there was nothing to remove.
pub async fn remove_dir_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(root: &TempDir) -> StorageService {
        StorageService::new(root.path().join("videos"), root.path().join("outputs"), root.path().join("zips"))
    }

    #[tokio::test]
    async fn finds_upload_by_job_id_suffix() {
        let root = TempDir::new().unwrap();
        let storage = storage(&root);
        storage.ensure_dirs().await.unwrap();

        fs::write(storage.upload_path("clip_abc.mp4"), b"x").await.unwrap();
        fs::write(storage.upload_path("clip_abcd.mp4"), b"x").await.unwrap();

        let found = storage.find_upload("abc").await.unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "clip_abc.mp4");
        assert!(storage.find_upload("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_archives_ignores_partial_and_foreign_files() {
        let root = TempDir::new().unwrap();
        let storage = storage(&root);
        storage.ensure_dirs().await.unwrap();

        fs::write(storage.archive_path("done"), b"zip").await.unwrap();
        fs::write(storage.partial_archive_path("writing"), b"zi").await.unwrap();
        fs::write(storage.archive_dir.join("notes.txt"), b"").await.unwrap();

        let archives = storage.list_archives().await.unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].job_id, "done");
    }

    #[tokio::test]
    async fn removals_tolerate_missing_targets() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");
        assert!(!remove_file_if_exists(&missing).await.unwrap());
        assert!(!remove_dir_if_exists(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn unreadable_or_mismatched_entries_are_skipped() {
        let root = TempDir::new().unwrap();
        let storage = storage(&root);
        storage.ensure_dirs().await.unwrap();

        let denied = Err(std::io::Error::new(ErrorKind::PermissionDenied, "denied"));
        assert!(modified_at(&storage.archive_path("x"), denied, false).is_none());
        let vanished = Err(std::io::Error::from(ErrorKind::NotFound));
        assert!(modified_at(&storage.archive_path("x"), vanished, false).is_none());

        fs::create_dir(storage.archive_dir.join("folder.zip")).await.unwrap();
        fs::write(storage.archive_path("kept"), b"zip").await.unwrap();
        let archives = storage.list_archives().await.unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].job_id, "kept");
    }

    #[tokio::test]
    async fn list_work_dirs_returns_directories_only() {
        let root = TempDir::new().unwrap();
        let storage = storage(&root);
        storage.ensure_dirs().await.unwrap();

        fs::create_dir(storage.work_dir("job1")).await.unwrap();
        fs::write(storage.output_dir.join("stray.txt"), b"").await.unwrap();

        let dirs = storage.list_work_dirs().await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].job_id, "job1");
        assert_eq!(dirs[0].path, storage.work_dir("job1"));
    }
}
