use super::model::JobStatus;
use super::repository::JobRepository;
use crate::common::error::JobError;
use crate::infrastructure::storage::local::{remove_dir_if_exists, remove_file_if_exists, StorageService};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// The archive was handed to the requester; it stays until it expires.
    Delivered,
    /// The archive outlived its TTL and goes too.
    Expired,
    /// The pipeline failed; no archive was produced.
    Failed,
    /// Every rendition was produced but the archive could not be written.
    /// The working directory stays in place until the sweeper reclaims it.
    PackagingFailed,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<JobError>,
    /// Set when the job was still in a state that forbids cleanup.
    pub refused: bool,
}

/// Reclaims a job's upload, working directory and, on expiry, its archive.
/// Every step runs even when an earlier one failed, and missing targets are
/// not errors, so calling it twice is harmless.
#[derive(Clone)]
pub struct CleanupCoordinator {
    storage: StorageService,
    jobs: JobRepository,
}

impl CleanupCoordinator {
    pub fn new(storage: StorageService, jobs: JobRepository) -> Self {
        Self { storage, jobs }
    }

    fn permits(status: JobStatus, reason: CleanupReason) -> bool {
        match status {
            s if s.is_in_flight() => false,
            JobStatus::Ready => reason == CleanupReason::Expired,
            _ => true,
        }
    }

    /// Callers that race with delivery or expiry must hold the job's lock.
    pub async fn cleanup(&self, job_id: &str, reason: CleanupReason) -> CleanupReport {
        let mut report = CleanupReport::default();
        let job = self.jobs.get(job_id).await;

        if let Some(job) = &job {
            if !Self::permits(job.status, reason) {
                warn!(job_id, status = %job.status, ?reason, "Cleanup refused, job still in use");
                report.refused = true;
                return report;
            }
        }

        let upload = match &job {
            Some(job) => Some(job.source_path.clone()),
            None => match self.storage.find_upload(job_id).await {
                Ok(found) => found,
                Err(e) => {
                    report.failures.push(JobError::Cleanup {
                        path: self.storage.upload_dir.clone(),
                        source: e,
                    });
                    None
                }
            },
        };
        if let Some(path) = upload {
            Self::record(&mut report, path.clone(), remove_file_if_exists(&path).await);
        }

        let work_dir = self.storage.work_dir(job_id);
        if reason == CleanupReason::PackagingFailed {
            info!(job_id, "Keeping working directory {} after packaging failure", work_dir.display());
        } else {
            Self::record(&mut report, work_dir.clone(), remove_dir_if_exists(&work_dir).await);
        }

        if reason == CleanupReason::Expired {
            let archive = self.storage.archive_path(job_id);
            Self::record(&mut report, archive.clone(), remove_file_if_exists(&archive).await);
        }

        for failure in &report.failures {
            warn!(job_id, "Cleanup step failed: {}", failure);
        }

        if job.is_some() {
            self.jobs.transition(job_id, JobStatus::Purged).await;
            self.jobs.remove(job_id).await;
        }

        info!(
            job_id,
            ?reason,
            removed = report.removed.len(),
            failed = report.failures.len(),
            "🧹 Job cleaned up"
        );
        report
    }

    fn record(report: &mut CleanupReport, path: PathBuf, outcome: std::io::Result<bool>) {
        match outcome {
            Ok(true) => report.removed.push(path),
            Ok(false) => debug!("Nothing to remove at {}", path.display()),
            Err(source) => report.failures.push(JobError::Cleanup { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::jobs::model::Job;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        storage: StorageService,
        jobs: JobRepository,
        coordinator: CleanupCoordinator,
    }

    async fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let storage = StorageService::new(root.path().join("v"), root.path().join("o"), root.path().join("z"));
        storage.ensure_dirs().await.unwrap();
        let jobs = JobRepository::new();
        let coordinator = CleanupCoordinator::new(storage.clone(), jobs.clone());
        Fixture { _root: root, storage, jobs, coordinator }
    }

    fn materialize(storage: &StorageService, id: &str) -> PathBuf {
        let upload = storage.upload_path(&format!("clip_{}.mp4", id));
        std::fs::write(&upload, b"src").unwrap();
        std::fs::create_dir_all(storage.work_dir(id).join("720p")).unwrap();
        std::fs::write(storage.work_dir(id).join("720p/index.m3u8"), b"#EXTM3U").unwrap();
        std::fs::write(storage.archive_path(id), b"zip").unwrap();
        upload
    }

    async fn ready_job(jobs: &JobRepository, id: &str, upload: PathBuf) {
        jobs.insert(Job::new(id.into(), upload, "clip".into(), None, vec![])).await;
        for next in [JobStatus::Transcoding, JobStatus::Packaging, JobStatus::Ready] {
            assert!(jobs.transition(id, next).await);
        }
    }

    #[tokio::test]
    async fn delivered_cleanup_keeps_archive() {
        let f = fixture().await;
        let upload = materialize(&f.storage, "a");
        ready_job(&f.jobs, "a", upload.clone()).await;
        f.jobs.transition("a", JobStatus::Delivered).await;

        let report = f.coordinator.cleanup("a", CleanupReason::Delivered).await;
        assert!(report.failures.is_empty());
        assert!(!upload.exists());
        assert!(!f.storage.work_dir("a").exists());
        assert!(f.storage.archive_path("a").exists());
        assert!(f.jobs.get("a").await.is_none());
    }

    #[tokio::test]
    async fn expired_cleanup_is_idempotent() {
        let f = fixture().await;
        let upload = materialize(&f.storage, "b");
        ready_job(&f.jobs, "b", upload.clone()).await;
        f.jobs.transition("b", JobStatus::Expired).await;

        let first = f.coordinator.cleanup("b", CleanupReason::Expired).await;
        assert_eq!(first.removed.len(), 3);

        let second = f.coordinator.cleanup("b", CleanupReason::Expired).await;
        assert!(second.removed.is_empty());
        assert!(second.failures.is_empty());
        assert!(!upload.exists());
        assert!(!f.storage.work_dir("b").exists());
        assert!(!f.storage.archive_path("b").exists());
    }

    #[tokio::test]
    async fn unknown_job_upload_is_found_by_suffix() {
        let f = fixture().await;
        let upload = materialize(&f.storage, "c");

        let report = f.coordinator.cleanup("c", CleanupReason::Expired).await;
        assert_eq!(report.removed.len(), 3);
        assert!(!upload.exists());
    }

    #[tokio::test]
    async fn refuses_undelivered_or_in_flight_jobs() {
        let f = fixture().await;
        let upload = materialize(&f.storage, "d");
        ready_job(&f.jobs, "d", upload.clone()).await;

        let report = f.coordinator.cleanup("d", CleanupReason::Delivered).await;
        assert!(report.refused);
        assert!(upload.exists());
        assert!(f.storage.work_dir("d").exists());

        f.jobs
            .insert(Job::new("e".into(), upload.clone(), "clip".into(), None, vec![]))
            .await;
        assert!(f.coordinator.cleanup("e", CleanupReason::Failed).await.refused);
    }

    #[tokio::test]
    async fn packaging_failure_keeps_working_directory() {
        let f = fixture().await;
        let upload = materialize(&f.storage, "p");
        std::fs::remove_file(f.storage.archive_path("p")).unwrap();
        f.jobs.insert(Job::new("p".into(), upload.clone(), "clip".into(), None, vec![])).await;
        f.jobs.transition("p", JobStatus::Transcoding).await;
        f.jobs.transition("p", JobStatus::Packaging).await;
        assert!(f.jobs.fail("p", "disk full").await);

        let report = f.coordinator.cleanup("p", CleanupReason::PackagingFailed).await;
        assert!(report.failures.is_empty());
        assert_eq!(report.removed, vec![upload.clone()]);
        assert!(!upload.exists());
        assert!(f.storage.work_dir("p").join("720p/index.m3u8").exists());
        assert!(f.jobs.get("p").await.is_none());
    }
}
