use super::model::{Job, Manifest};
use crate::common::error::{JobError, Result};
use crate::infrastructure::encoder::ffmpeg::{EncodeRequest, Encoder};
use crate::infrastructure::storage::local::{StorageService, MANIFEST_NAME};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info};

/// Runs the encoder once per profile, strictly in declared order, and writes
/// the top-level manifest once every rendition is done.
pub struct RenditionOrchestrator {
    encoder: Arc<dyn Encoder>,
    storage: StorageService,
    audio_codec: String,
}

impl RenditionOrchestrator {
    pub fn new(encoder: Arc<dyn Encoder>, storage: StorageService, audio_codec: impl Into<String>) -> Self {
        Self {
            encoder,
            storage,
            audio_codec: audio_codec.into(),
        }
    }

    /// Stops at the first failing profile. Subdirectories of profiles that
    /// already ran stay on disk until the job is cleaned up.
    pub async fn transcode(&self, job: &Job) -> Result<Manifest> {
        let work_dir = self.storage.work_dir(&job.id);
        match fs::create_dir(&work_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                error!(job_id = %job.id, "Working directory already exists, id allocation is broken");
                return Err(JobError::WorkDirExists(work_dir));
            }
            Err(e) => return Err(e.into()),
        }

        let mut manifest = Manifest::default();
        for (index, profile) in job.profiles.iter().enumerate() {
            info!(
                job_id = %job.id,
                profile = %profile.name,
                "🎥 Encoding rendition {}/{}",
                index + 1,
                job.profiles.len()
            );

            let request = EncodeRequest {
                input: job.source_path.clone(),
                resolution: profile.resolution,
                video_bitrate: profile.bitrate.clone(),
                audio_codec: self.audio_codec.clone(),
                segment_duration: profile.segment_duration,
                output_dir: work_dir.join(&profile.name),
                playlist_name: MANIFEST_NAME.to_string(),
            };
            fs::create_dir(&request.output_dir).await?;

            if let Err(detail) = self.encoder.encode(&request).await {
                error!(job_id = %job.id, profile = %profile.name, "❌ Encoder failed: {}", detail);
                return Err(JobError::Encoding {
                    profile: profile.name.clone(),
                    detail,
                });
            }

            if !fs::try_exists(request.playlist_path()).await? {
                return Err(JobError::Encoding {
                    profile: profile.name.clone(),
                    detail: "encoder exited successfully but wrote no playlist".to_string(),
                });
            }

            manifest.push(profile, format!("{}/{}", profile.name, MANIFEST_NAME));
        }

        fs::write(work_dir.join(MANIFEST_NAME), manifest.render()).await?;
        info!(job_id = %job.id, renditions = manifest.entries.len(), "✅ Manifest written");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::parse_profiles;
    use crate::test_support::ScriptedEncoder;
    use tempfile::TempDir;

    const FULL_SET: &str = "360p=640x360@800k,480p=854x480@1400k,720p=1280x720@2500k,1080p=1920x1080@5000k";

    fn setup(root: &TempDir, encoder: Arc<ScriptedEncoder>) -> (StorageService, RenditionOrchestrator) {
        let storage = StorageService::new(root.path().join("v"), root.path().join("o"), root.path().join("z"));
        std::fs::create_dir_all(&storage.output_dir).unwrap();
        let orchestrator = RenditionOrchestrator::new(encoder, storage.clone(), "aac");
        (storage, orchestrator)
    }

    fn job(id: &str, profiles: &str) -> Job {
        Job::new(
            id.into(),
            format!("videos/clip_{}.mp4", id).into(),
            "clip".into(),
            None,
            parse_profiles(profiles, 10).unwrap(),
        )
    }

    #[tokio::test]
    async fn encodes_every_profile_in_order() {
        let root = TempDir::new().unwrap();
        let encoder = Arc::new(ScriptedEncoder::default());
        let (storage, orchestrator) = setup(&root, encoder.clone());

        let manifest = orchestrator.transcode(&job("j1", FULL_SET)).await.unwrap();
        assert_eq!(encoder.invoked(), ["360p", "480p", "720p", "1080p"]);
        assert_eq!(manifest.entries.len(), 4);

        let written = std::fs::read_to_string(storage.work_dir("j1").join("index.m3u8")).unwrap();
        assert_eq!(written, manifest.render());
        assert_eq!(written.matches("#EXT-X-STREAM-INF").count(), 4);
        assert!(written.contains("#EXT-X-STREAM-INF:BANDWIDTH=1400k,RESOLUTION=854x480\n480p/index.m3u8"));
        for name in ["360p", "480p", "720p", "1080p"] {
            assert!(storage.work_dir("j1").join(name).join("index.m3u8").exists());
        }
    }

    #[tokio::test]
    async fn stops_at_first_failed_profile() {
        let root = TempDir::new().unwrap();
        let encoder = Arc::new(ScriptedEncoder::failing_on(&["480p"]));
        let (storage, orchestrator) = setup(&root, encoder.clone());

        let err = orchestrator.transcode(&job("j2", FULL_SET)).await.unwrap_err();
        match err {
            JobError::Encoding { profile, detail } => {
                assert_eq!(profile, "480p");
                assert!(detail.contains("scripted failure"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(encoder.invoked(), ["360p", "480p"]);
        let work = storage.work_dir("j2");
        assert!(work.join("360p/index.m3u8").exists());
        assert!(!work.join("720p").exists());
        assert!(!work.join("index.m3u8").exists());
    }

    #[tokio::test]
    async fn refuses_existing_working_directory() {
        let root = TempDir::new().unwrap();
        let encoder = Arc::new(ScriptedEncoder::default());
        let (storage, orchestrator) = setup(&root, encoder.clone());
        std::fs::create_dir(storage.work_dir("j3")).unwrap();

        let err = orchestrator.transcode(&job("j3", FULL_SET)).await.unwrap_err();
        assert!(matches!(err, JobError::WorkDirExists(_)));
        assert!(encoder.invoked().is_empty());
    }

    #[tokio::test]
    async fn success_without_playlist_is_an_encoding_failure() {
        let root = TempDir::new().unwrap();
        let encoder = Arc::new(ScriptedEncoder::silent());
        let (_, orchestrator) = setup(&root, encoder);

        let err = orchestrator.transcode(&job("j4", "720p=1280x720@2500k")).await.unwrap_err();
        assert!(matches!(err, JobError::Encoding { .. }));
    }
}
