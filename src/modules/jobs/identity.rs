use super::repository::JobRepository;
use crate::common::error::{JobError, Result};
use crate::infrastructure::storage::local::StorageService;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Hands out job ids that collide with neither an existing working directory
/// nor a job the registry already knows about.
#[derive(Clone)]
pub struct IdentityAllocator {
    storage: StorageService,
    jobs: JobRepository,
    generator: IdGenerator,
    max_attempts: u32,
}

impl IdentityAllocator {
    pub fn new(storage: StorageService, jobs: JobRepository) -> Self {
        Self {
            storage,
            jobs,
            generator: Arc::new(|| Uuid::new_v4().to_string()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[cfg(test)]
    pub fn with_generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    #[cfg(test)]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// The returned id is reserved in the registry; callers either insert a
    /// job under it or release it.
    pub async fn allocate(&self) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = (self.generator)();

            if self.storage.work_dir_exists(&candidate).await? {
                warn!(attempt, "Job id {} collides with an existing working directory", candidate);
                continue;
            }
            if !self.jobs.reserve(&candidate).await {
                warn!(attempt, "Job id {} is already in use", candidate);
                continue;
            }
            return Ok(candidate);
        }

        Err(JobError::IdExhausted(self.max_attempts))
    }
}
