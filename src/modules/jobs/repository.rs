use super::model::{Job, JobStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, Job>,
    /// Ids handed out by the allocator whose upload is still being received.
    reserved: HashSet<String>,
}

/// In-memory registry of every job that has not been purged yet.
#[derive(Clone, Default)]
pub struct JobRepository {
    inner: Arc<RwLock<Registry>>,
}

impl JobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` unless a job or another reservation already holds it.
    pub async fn reserve(&self, id: &str) -> bool {
        let mut registry = self.inner.write().await;
        if registry.jobs.contains_key(id) {
            return false;
        }
        registry.reserved.insert(id.to_string())
    }

    pub async fn release(&self, id: &str) {
        self.inner.write().await.reserved.remove(id);
    }

    pub async fn insert(&self, job: Job) {
        let mut registry = self.inner.write().await;
        registry.reserved.remove(&job.id);
        registry.jobs.insert(job.id.clone(), job);
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.inner.read().await.jobs.get(id).cloned()
    }

    pub async fn status(&self, id: &str) -> Option<JobStatus> {
        self.inner.read().await.jobs.get(id).map(|j| j.status)
    }

    /// Applies a state-machine move. Illegal moves and unknown ids are
    /// refused and logged.
    pub async fn transition(&self, id: &str, next: JobStatus) -> bool {
        let mut registry = self.inner.write().await;
        let Some(job) = registry.jobs.get_mut(id) else {
            warn!(job_id = id, "Transition to {} for unknown job", next);
            return false;
        };

        if !job.status.can_transition_to(next) {
            warn!(job_id = id, "Refusing illegal transition {} -> {}", job.status, next);
            return false;
        }
        job.status = next;
        true
    }

    pub async fn fail(&self, id: &str, cause: &str) -> bool {
        let mut registry = self.inner.write().await;
        let Some(job) = registry.jobs.get_mut(id) else {
            return false;
        };
        if !job.status.can_transition_to(JobStatus::Failed) {
            warn!(job_id = id, "Refusing to fail job in state {}", job.status);
            return false;
        }
        job.status = JobStatus::Failed;
        job.error = Some(cause.to_string());
        true
    }

    pub async fn remove(&self, id: &str) -> Option<Job> {
        let mut registry = self.inner.write().await;
        registry.reserved.remove(id);
        registry.jobs.remove(id)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }
}
