use crate::modules::jobs::cleanup::{CleanupCoordinator, CleanupReason};
use crate::modules::jobs::model::{Archive, JobStatus};
use crate::modules::jobs::repository::JobRepository;
use crate::infrastructure::storage::local::{remove_dir_if_exists, StorageService};
use crate::infrastructure::storage::locks::JobLocks;
use crate::state::AppState;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    /// Expired archives left alone because a download holds the job.
    pub busy: usize,
    /// Working directories removed without an archive to go with them.
    pub orphaned: usize,
    pub failed: usize,
}

/// Periodically deletes archives older than the TTL, together with whatever
/// the job still has on disk.
pub struct ExpirySweeper {
    storage: StorageService,
    jobs: JobRepository,
    locks: JobLocks,
    cleanup: CleanupCoordinator,
    ttl: Duration,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            storage: state.storage.clone(),
            jobs: state.jobs.clone(),
            locks: state.locks.clone(),
            cleanup: state.cleanup.clone(),
            ttl: state.config.archive_ttl,
            interval: state.config.sweep_interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "🧹 Expiry sweeper started (ttl {}s, every {}s)",
            self.ttl.as_secs(),
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep_once(SystemTime::now()).await;
                    if report.expired > 0 || report.orphaned > 0 || report.failed > 0 {
                        info!(?report, "Sweep finished");
                    } else {
                        debug!(?report, "Sweep finished");
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    /// One pass over the archive store, then over working directories that
    /// no job or archive accounts for. A failure on one entry is logged and
    /// the pass moves on.
    pub async fn sweep_once(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        self.sweep_archives(now, &mut report).await;
        self.sweep_work_dirs(now, &mut report).await;
        report
    }

    async fn sweep_archives(&self, now: SystemTime, report: &mut SweepReport) {
        let archives = match self.storage.list_archives().await {
            Ok(archives) => archives,
            Err(e) => {
                error!("Failed to list archive store {}: {}", self.storage.archive_dir.display(), e);
                report.failed += 1;
                return;
            }
        };

        for stored in archives {
            report.scanned += 1;
            let archive = Archive::new(stored.job_id, stored.path, stored.created_at, self.ttl);
            if !archive.is_expired(now) {
                continue;
            }

            let Some(guard) = self.locks.try_lock(&archive.job_id) else {
                debug!(job_id = %archive.job_id, "Archive is being downloaded, retrying next sweep");
                report.busy += 1;
                continue;
            };

            if self.jobs.status(&archive.job_id).await == Some(JobStatus::Ready) {
                self.jobs.transition(&archive.job_id, JobStatus::Expired).await;
            }

            let outcome = self.cleanup.cleanup(&archive.job_id, CleanupReason::Expired).await;
            drop(guard);
            self.locks.release(&archive.job_id);

            if outcome.refused || !outcome.failures.is_empty() {
                warn!(job_id = %archive.job_id, "Expired archive not fully reclaimed");
                report.failed += 1;
            } else {
                report.expired += 1;
            }
        }
    }

    /// Working directories kept after a packaging failure have no archive and
    /// no registry entry; they go once they are older than the TTL.
    async fn sweep_work_dirs(&self, now: SystemTime, report: &mut SweepReport) {
        let dirs = match self.storage.list_work_dirs().await {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to list working directories in {}: {}", self.storage.output_dir.display(), e);
                report.failed += 1;
                return;
            }
        };

        for dir in dirs {
            if now < dir.modified_at + self.ttl || self.jobs.status(&dir.job_id).await.is_some() {
                continue;
            }
            match fs::try_exists(self.storage.archive_path(&dir.job_id)).await {
                Ok(false) => {}
                Ok(true) => continue,
                Err(e) => {
                    warn!(job_id = %dir.job_id, "Cannot check archive for working directory: {}", e);
                    report.failed += 1;
                    continue;
                }
            }

            let Some(guard) = self.locks.try_lock(&dir.job_id) else {
                report.busy += 1;
                continue;
            };
            let removed = remove_dir_if_exists(&dir.path).await;
            drop(guard);
            self.locks.release(&dir.job_id);

            match removed {
                Ok(_) => {
                    info!(job_id = %dir.job_id, "🧹 Stale working directory removed");
                    report.orphaned += 1;
                }
                Err(e) => {
                    warn!(job_id = %dir.job_id, "Failed to remove stale working directory {}: {}", dir.path.display(), e);
                    report.failed += 1;
                }
            }
        }
    }
}
