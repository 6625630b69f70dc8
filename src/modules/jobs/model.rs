use crate::config::settings::{RenditionProfile, Resolution};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Transcoding,
    Packaging,
    Ready,
    Delivered,
    Expired,
    Failed,
    NotifiedFailure,
    Purged,
}

impl JobStatus {
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Transcoding)
                | (Transcoding, Packaging)
                | (Transcoding, Failed)
                | (Packaging, Ready)
                | (Packaging, Failed)
                | (Ready, Delivered)
                | (Ready, Expired)
                | (Delivered, Purged)
                | (Expired, Purged)
                | (Failed, NotifiedFailure)
                | (Failed, Purged)
                | (NotifiedFailure, Purged)
        )
    }

    /// Upload, working directory or archive may still be in use.
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Transcoding | JobStatus::Packaging)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Transcoding => "TRANSCODING",
            JobStatus::Packaging => "PACKAGING",
            JobStatus::Ready => "READY",
            JobStatus::Delivered => "DELIVERED",
            JobStatus::Expired => "EXPIRED",
            JobStatus::Failed => "FAILED",
            JobStatus::NotifiedFailure => "NOTIFIED_FAILURE",
            JobStatus::Purged => "PURGED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub source_path: PathBuf,
    /// Sanitized original file stem, used to name the delivered archive.
    pub original_stem: String,
    pub status: JobStatus,
    pub created_at: OffsetDateTime,
    pub error: Option<String>,
    pub contact: Option<String>,
    pub profiles: Vec<RenditionProfile>,
}

impl Job {
    pub fn new(
        id: String,
        source_path: PathBuf,
        original_stem: String,
        contact: Option<String>,
        profiles: Vec<RenditionProfile>,
    ) -> Self {
        Self {
            id,
            source_path,
            original_stem,
            status: JobStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
            error: None,
            contact,
            profiles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub bandwidth: String,
    pub resolution: Resolution,
    pub uri: String,
}

/// Top-level playlist. Entries keep the order in which renditions completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<StreamInfo>,
}

impl Manifest {
    pub fn push(&mut self, profile: &RenditionProfile, uri: String) {
        self.entries.push(StreamInfo {
            bandwidth: profile.bitrate.clone(),
            resolution: profile.resolution,
            uri,
        });
    }

    pub fn render(&self) -> String {
        let mut out = String::from("#EXTM3U\n");
        for entry in &self.entries {
            out.push_str(&format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}\n",
                entry.bandwidth, entry.resolution, entry.uri
            ));
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Archive {
    pub job_id: String,
    pub path: PathBuf,
    pub expires_at: SystemTime,
}

impl Archive {
    pub fn new(job_id: String, path: PathBuf, created_at: SystemTime, ttl: Duration) -> Self {
        Self {
            job_id,
            path,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::parse_profiles;

    #[test]
    fn manifest_lists_each_rendition_after_header() {
        let profiles = parse_profiles("720p=1280x720@2500k,1080p=1920x1080@5000k", 10).unwrap();
        let mut manifest = Manifest::default();
        for p in &profiles {
            manifest.push(p, format!("{}/index.m3u8", p.name));
        }

        let rendered = manifest.render();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(
            lines,
            [
                "#EXTM3U",
                "#EXT-X-STREAM-INF:BANDWIDTH=2500k,RESOLUTION=1280x720",
                "720p/index.m3u8",
                "#EXT-X-STREAM-INF:BANDWIDTH=5000k,RESOLUTION=1920x1080",
                "1080p/index.m3u8",
            ]
        );
    }

    #[test]
    fn state_machine_paths() {
        use JobStatus::*;
        let happy = [Pending, Transcoding, Packaging, Ready, Delivered, Purged];
        assert!(happy.windows(2).all(|w| w[0].can_transition_to(w[1])));
        let failed = [Pending, Transcoding, Failed, NotifiedFailure, Purged];
        assert!(failed.windows(2).all(|w| w[0].can_transition_to(w[1])));
        assert!(Ready.can_transition_to(Expired));

        assert!(!Pending.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Purged));
        assert!(!Purged.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Expired));
    }

    #[test]
    fn archive_expires_at_ttl_boundary() {
        let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let archive = Archive::new("a".into(), "a.zip".into(), created, Duration::from_secs(60));
        assert!(!archive.is_expired(created + Duration::from_secs(59)));
        assert!(archive.is_expired(created + Duration::from_secs(60)));
    }
}
