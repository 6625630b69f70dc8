use crate::config::settings::AppConfig;
use crate::infrastructure::archive::packager::Packager;
use crate::infrastructure::encoder::ffmpeg::Encoder;
use crate::infrastructure::mail::smtp::Notifier;
use crate::infrastructure::storage::local::StorageService;
use crate::infrastructure::storage::locks::JobLocks;
use crate::modules::jobs::cleanup::CleanupCoordinator;
use crate::modules::jobs::events::TranscodeJob;
use crate::modules::jobs::identity::IdentityAllocator;
use crate::modules::jobs::orchestrator::RenditionOrchestrator;
use crate::modules::jobs::repository::JobRepository;
use async_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: StorageService,
    pub jobs: JobRepository,
    pub locks: JobLocks,
    pub identity: IdentityAllocator,
    pub orchestrator: Arc<RenditionOrchestrator>,
    pub packager: Packager,
    pub cleanup: CleanupCoordinator,
    pub notifier: Arc<dyn Notifier>,
    pub queue: Sender<TranscodeJob>,
    /// Bounds simultaneous encoder runs across sync requests and workers.
    pub encoder_slots: Arc<Semaphore>,
}

impl AppState {
    /// Returns the state plus the receiving end of the transcode queue for
    /// the worker pool.
    pub fn new(
        config: AppConfig,
        encoder: Arc<dyn Encoder>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, Receiver<TranscodeJob>) {
        let storage = StorageService::new(&config.upload_dir, &config.output_dir, &config.archive_dir);
        let jobs = JobRepository::new();
        let (queue, receiver) = async_channel::bounded(config.queue_capacity);

        let state = Self {
            identity: IdentityAllocator::new(storage.clone(), jobs.clone()),
            orchestrator: Arc::new(RenditionOrchestrator::new(encoder, storage.clone(), &config.audio_codec)),
            packager: Packager::new(storage.clone()),
            cleanup: CleanupCoordinator::new(storage.clone(), jobs.clone()),
            encoder_slots: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            locks: JobLocks::new(),
            config: Arc::new(config),
            storage,
            jobs,
            notifier,
            queue,
        };
        (state, receiver)
    }
}
