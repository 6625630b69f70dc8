use crate::modules::jobs::events::TranscodeJob;
use crate::modules::jobs::service::JobService;
use crate::state::AppState;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Spawns the bounded worker pool that drains the transcode queue.
pub fn start_transcoder_workers(
    state: AppState,
    receiver: Receiver<TranscodeJob>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let workers = state.config.max_concurrent_jobs;
    info!("🎥 Starting {} transcoder worker(s)...", workers);

    (0..workers)
        .map(|worker| {
            let state = state.clone();
            let receiver = receiver.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { run_worker(worker, state, receiver, shutdown).await })
        })
        .collect()
}

async fn run_worker(worker: usize, state: AppState, receiver: Receiver<TranscodeJob>, shutdown: CancellationToken) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        info!(worker, job_id = %job.job_id, "📦 Received transcoding job");
        JobService::process_queued(&state, &job.job_id).await;
    }

    info!(worker, "Transcoder worker stopped");
}
