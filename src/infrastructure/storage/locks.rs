use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-job mutual exclusion between archive delivery and expiry.
#[derive(Clone, Default)]
pub struct JobLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

pub type JobGuard = OwnedMutexGuard<()>;

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, job_id: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.entry(job_id.to_string()).or_default().clone()
    }

    pub async fn lock(&self, job_id: &str) -> JobGuard {
        self.entry(job_id).lock_owned().await
    }

    /// `None` while another holder (usually an in-flight download) has the job.
    pub fn try_lock(&self, job_id: &str) -> Option<JobGuard> {
        self.entry(job_id).try_lock_owned().ok()
    }

    /// Drops the entry once nobody else references it.
    pub fn release(&self, job_id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if map.get(job_id).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(job_id);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
