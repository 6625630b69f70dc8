use super::cleanup::CleanupReason;
use super::dto::{JobResponse, UploadAccepted, UploadForm};
use super::events::TranscodeJob;
use super::model::{Archive, Job, JobStatus};
use crate::common::error::{JobError, Result};
use crate::common::upload::{stream_to_disk, validate_filename, UploadName, UploadStreamError};
use crate::config::settings::{ProcessingMode, RenditionProfile};
use crate::infrastructure::mail::smtp::{failure_message, ready_message};
use crate::infrastructure::storage::local::remove_file_if_exists;
use crate::infrastructure::storage::locks::JobGuard;
use crate::state::AppState;
use bytes::Bytes;
use futures_util::Stream;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::fs::File;
use tracing::{debug, error, info, warn};

/// An upload sitting in the holding area under a reserved job id.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub job_id: String,
    pub path: PathBuf,
    pub name: UploadName,
}

/// An open archive plus the job lock that keeps the sweeper away from it.
pub struct Delivery {
    pub file: File,
    pub len: u64,
    pub guard: JobGuard,
}

pub enum Submission {
    /// Sync mode: the archive is ready to be streamed back.
    Archive { job_id: String, file_name: String },
    /// Async mode: a worker will pick the job up.
    Queued(UploadAccepted),
}

pub struct JobService;

impl JobService {
    pub fn resolve_profiles(state: &AppState, selector: Option<&str>) -> Result<Vec<RenditionProfile>> {
        match selector {
            None => Ok(state.config.profiles.clone()),
            Some(name) => state
                .config
                .profile(name)
                .map(|p| vec![p.clone()])
                .ok_or_else(|| {
                    let known: Vec<_> = state.config.profiles.iter().map(|p| p.name.as_str()).collect();
                    JobError::validation(format!(
                        "Unknown profile `{}`. Available profiles: {}",
                        name,
                        known.join(", ")
                    ))
                }),
        }
    }

    /// Validates the file name, reserves a job id and streams the payload into
    /// the holding area.
    pub async fn receive_upload<S, E>(state: &AppState, stream: S, file_name: &str) -> Result<StoredUpload>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: UploadStreamError,
    {
        let name = validate_filename(file_name, &state.config.allowed_extensions)?;
        let job_id = state.identity.allocate().await?;
        let path = state.storage.upload_path(&name.stored_name(&job_id));

        info!(job_id = %job_id, "Receiving upload {}", file_name);
        if let Err(e) = stream_to_disk(stream, &path, state.config.upload_chunk_bytes).await {
            state.jobs.release(&job_id).await;
            return Err(e);
        }

        Ok(StoredUpload { job_id, path, name })
    }

    /// Drops an upload that will never become a job.
    pub async fn discard_upload(state: &AppState, upload: &StoredUpload) {
        if let Err(e) = remove_file_if_exists(&upload.path).await {
            warn!(job_id = %upload.job_id, "Failed to discard upload {}: {}", upload.path.display(), e);
        }
        state.jobs.remove(&upload.job_id).await;
    }

    pub async fn submit(state: &AppState, upload: StoredUpload, form: &UploadForm) -> Result<Submission> {
        let profiles = match Self::resolve_profiles(state, form.profile.as_deref()) {
            Ok(p) => p,
            Err(e) => {
                Self::discard_upload(state, &upload).await;
                return Err(e);
            }
        };

        let job_id = upload.job_id.clone();
        let job = Job::new(
            job_id.clone(),
            upload.path.clone(),
            upload.name.stem.clone(),
            form.email.clone(),
            profiles,
        );
        state.jobs.insert(job).await;

        match state.config.processing_mode {
            ProcessingMode::Sync => {
                Self::run_detached(state, &job_id).await?;
                Ok(Submission::Archive {
                    job_id,
                    file_name: format!("{}.zip", upload.name.stem),
                })
            }
            ProcessingMode::Async => {
                if let Err(e) = state.queue.try_send(TranscodeJob { job_id: job_id.clone() }) {
                    warn!(job_id = %job_id, closed = e.is_closed(), "Rejecting upload, transcode queue unavailable");
                    Self::discard_upload(state, &upload).await;
                    return Err(JobError::QueueFull);
                }

                info!(job_id = %job_id, "📨 Job queued");
                Ok(Submission::Queued(UploadAccepted {
                    download_url: state.config.download_url(&job_id),
                    job_id,
                    status: JobStatus::Pending,
                }))
            }
        }
    }

    /// Runs the pipeline, and failure handling, on a task of its own. The
    /// caller only awaits the outcome, so dropping the caller leaves the job
    /// to finish as Ready or be reclaimed as a failure.
    async fn run_detached(state: &AppState, job_id: &str) -> Result<PathBuf> {
        let task_state = state.clone();
        let task_id = job_id.to_string();
        let handle = tokio::spawn(async move {
            let outcome = Self::run_pipeline(&task_state, &task_id).await;
            if let Err(e) = &outcome {
                Self::handle_failure(&task_state, &task_id, e).await;
            }
            outcome
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(join) => {
                error!(job_id, "Pipeline task aborted: {}", join);
                let err = JobError::Io(std::io::Error::other(join));
                state.jobs.fail(job_id, &err.to_string()).await;
                Self::handle_failure(state, job_id, &err).await;
                Err(err)
            }
        }
    }

    /// Transcodes and packages one job. Only jobs whose orchestration
    /// succeeded ever reach the packager.
    pub async fn run_pipeline(state: &AppState, job_id: &str) -> Result<PathBuf> {
        let _permit = state
            .encoder_slots
            .acquire()
            .await
            .map_err(|e| JobError::Io(std::io::Error::other(e)))?;

        let job = state
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        state.jobs.transition(job_id, JobStatus::Transcoding).await;
        if let Err(e) = state.orchestrator.transcode(&job).await {
            state.jobs.fail(job_id, &e.to_string()).await;
            return Err(e);
        }

        state.jobs.transition(job_id, JobStatus::Packaging).await;
        let archive = match state.packager.package(job_id).await {
            Ok(path) => path,
            Err(e) => {
                state.jobs.fail(job_id, &e.to_string()).await;
                return Err(e);
            }
        };

        state.jobs.transition(job_id, JobStatus::Ready).await;
        info!(job_id, "✅ Job ready");
        Ok(archive)
    }

    /// Worker entry point for async mode.
    pub async fn process_queued(state: &AppState, job_id: &str) {
        match Self::run_pipeline(state, job_id).await {
            Ok(_) => {
                let contact = state.jobs.get(job_id).await.and_then(|j| j.contact);
                if let Some(contact) = contact {
                    let ttl_hours = state.config.archive_ttl.as_secs().div_ceil(3600);
                    let (subject, body) = ready_message(&state.config.download_url(job_id), ttl_hours);
                    if let Err(e) = state.notifier.notify(&contact, &subject, &body).await {
                        warn!(job_id, "Ready notification not delivered: {}", e);
                    }
                }
            }
            Err(e) => Self::handle_failure(state, job_id, &e).await,
        }
    }

    /// Tells the requester (if they left a contact) and reclaims everything
    /// the failed run left behind.
    pub async fn handle_failure(state: &AppState, job_id: &str, err: &JobError) {
        let Some(job) = state.jobs.get(job_id).await else {
            return;
        };

        if let Some(contact) = &job.contact {
            let cause = job.error.clone().unwrap_or_else(|| err.to_string());
            let (subject, body) = failure_message(&cause);
            match state.notifier.notify(contact, &subject, &body).await {
                Ok(()) => {
                    state.jobs.transition(job_id, JobStatus::NotifiedFailure).await;
                }
                Err(e) => warn!(job_id, "Failure notification not delivered: {}", e),
            }
        }

        let reason = match err {
            JobError::Packaging(_) => CleanupReason::PackagingFailed,
            _ => CleanupReason::Failed,
        };
        state.cleanup.cleanup(job_id, reason).await;
    }

    pub fn is_valid_id(job_id: &str) -> bool {
        !job_id.is_empty()
            && job_id.len() <= 64
            && job_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }

    /// Locks the job and opens its archive if it exists and has not expired.
    pub async fn open_archive(state: &AppState, job_id: &str) -> Result<Delivery> {
        if !Self::is_valid_id(job_id) {
            return Err(JobError::NotFound(job_id.to_string()));
        }

        let guard = state.locks.lock(job_id).await;
        match Self::open_locked(state, job_id).await {
            Ok((file, len)) => Ok(Delivery { file, len, guard }),
            Err(e) => {
                drop(guard);
                state.locks.release(job_id);
                Err(e)
            }
        }
    }

    async fn open_locked(state: &AppState, job_id: &str) -> Result<(File, u64)> {
        let not_found = || JobError::NotFound(job_id.to_string());

        let created_at = state.storage.archive_created_at(job_id).await?.ok_or_else(not_found)?;
        let archive = Archive::new(
            job_id.to_string(),
            state.storage.archive_path(job_id),
            created_at,
            state.config.archive_ttl,
        );
        if archive.is_expired(SystemTime::now()) {
            debug!(job_id, "Archive requested after expiry");
            return Err(not_found());
        }

        let file = match File::open(&archive.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Runs once the archive body has been fully handed over; the caller
    /// still holds the job lock.
    pub async fn complete_delivery(state: &AppState, job_id: &str) {
        if state.jobs.status(job_id).await != Some(JobStatus::Ready) {
            debug!(job_id, "Archive re-delivered, nothing left to reclaim");
            return;
        }
        if state.jobs.transition(job_id, JobStatus::Delivered).await {
            info!(job_id, "🚚 Archive delivered");
            state.cleanup.cleanup(job_id, CleanupReason::Delivered).await;
        }
    }

    pub async fn get_job(state: &AppState, job_id: &str) -> Result<JobResponse> {
        let job = state
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(JobResponse::from_job(&job, state.config.download_url(job_id)))
    }
}
