use crate::config::env::{self, EnvKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_PROFILES: &str =
    "360p=640x360@800k,480p=854x480@1400k,720p=1280x720@2500k,1080p=1920x1080@5000k";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid rendition profile `{0}`: expected name=WIDTHxHEIGHT@BITRATE")]
    Profile(String),
    #[error("duplicate rendition profile name `{0}`")]
    DuplicateProfile(String),
    #[error("at least one rendition profile is required")]
    NoProfiles,
    #[error("invalid PUBLIC_BASE_URL: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("invalid PROCESSING_MODE `{0}`: expected sync or async")]
    Mode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s.split_once('x').ok_or(())?;
        let width = w.trim().parse().map_err(|_| ())?;
        let height = h.trim().parse().map_err(|_| ())?;
        if width == 0 || height == 0 {
            return Err(());
        }
        Ok(Self { width, height })
    }
}

/// One target rendition. The bitrate is kept in encoder notation (`2500k`)
/// and is written verbatim into the top-level manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionProfile {
    pub name: String,
    pub resolution: Resolution,
    pub bitrate: String,
    pub segment_duration: u32,
}

impl RenditionProfile {
    fn parse(entry: &str, segment_duration: u32) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Profile(entry.to_string());

        let (name, definition) = entry.split_once('=').ok_or_else(invalid)?;
        let (resolution, bitrate) = definition.split_once('@').ok_or_else(invalid)?;
        let name = name.trim();
        let bitrate = bitrate.trim();

        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        let digits = bitrate.trim_end_matches(['k', 'K', 'm', 'M']);
        let valid_bitrate = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
        if !valid_name || !valid_bitrate {
            return Err(invalid());
        }

        Ok(Self {
            name: name.to_string(),
            resolution: resolution.parse().map_err(|_| invalid())?,
            bitrate: bitrate.to_string(),
            segment_duration,
        })
    }
}

/// Parses the ordered `name=WxH@bitrate` table. Declaration order is the
/// encoding order.
pub fn parse_profiles(raw: &str, segment_duration: u32) -> Result<Vec<RenditionProfile>, ConfigError> {
    let mut profiles: Vec<RenditionProfile> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let profile = RenditionProfile::parse(entry, segment_duration)?;
        if profiles.iter().any(|p| p.name == profile.name) {
            return Err(ConfigError::DuplicateProfile(profile.name));
        }
        profiles.push(profile);
    }

    if profiles.is_empty() {
        return Err(ConfigError::NoProfiles);
    }
    Ok(profiles)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingMode {
    /// The pipeline runs inside the upload request and the archive is the response.
    Sync,
    /// The upload is acknowledged at once and a worker runs the pipeline.
    Async,
}

impl FromStr for ProcessingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            other => Err(ConfigError::Mode(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub tls: bool,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub profiles: Vec<RenditionProfile>,
    pub audio_codec: String,
    pub encoder_bin: String,
    pub archive_ttl: Duration,
    pub sweep_interval: Duration,
    pub public_base_url: Url,
    pub processing_mode: ProcessingMode,
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    pub max_upload_bytes: usize,
    pub upload_chunk_bytes: usize,
    pub smtp: SmtpSettings,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let segment_duration = env::get_parsed(EnvKey::SegmentDuration, 10u32).max(1);
        let profiles = parse_profiles(
            &env::get_or(EnvKey::RenditionProfiles, DEFAULT_PROFILES),
            segment_duration,
        )?;

        let allowed_extensions = env::get_or(EnvKey::AllowedExtensions, "mp4,avi,mov")
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            upload_dir: env::get_or(EnvKey::UploadDir, "videos").into(),
            output_dir: env::get_or(EnvKey::OutputDir, "outputs").into(),
            archive_dir: env::get_or(EnvKey::ArchiveDir, "zips").into(),
            allowed_extensions,
            profiles,
            audio_codec: env::get_or(EnvKey::AudioCodec, "aac"),
            encoder_bin: env::get_or(EnvKey::EncoderBin, "ffmpeg"),
            archive_ttl: Duration::from_secs(env::get_parsed(EnvKey::ArchiveTtl, 3600)),
            sweep_interval: Duration::from_secs(env::get_parsed(EnvKey::SweepInterval, 3600u64).max(1)),
            public_base_url: Url::parse(&env::get_or(EnvKey::PublicBaseUrl, "http://localhost:3000"))?,
            processing_mode: env::get_or(EnvKey::ProcessingMode, "sync").parse()?,
            max_concurrent_jobs: env::get_parsed(EnvKey::MaxConcurrentJobs, 2usize).max(1),
            queue_capacity: env::get_parsed(EnvKey::QueueCapacity, 32usize).max(1),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, 2 * 1024 * 1024 * 1024),
            upload_chunk_bytes: env::get_parsed(EnvKey::UploadChunkBytes, 1024 * 1024usize).max(4096),
            smtp: SmtpSettings {
                host: env::get_or(EnvKey::SmtpHost, ""),
                port: env::get_parsed(EnvKey::SmtpPort, 587),
                username: env::get_opt(EnvKey::SmtpUsername),
                password: env::get_opt(EnvKey::SmtpPassword),
                from: env::get_or(EnvKey::SmtpFrom, "HLS Forge <noreply@localhost>"),
                tls: env::get_parsed(EnvKey::SmtpTls, true),
            },
        })
    }

    pub fn profile(&self, name: &str) -> Option<&RenditionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Public link for fetching a job's archive.
    pub fn download_url(&self, job_id: &str) -> String {
        self.public_base_url
            .join(&format!("api/v1/download/{}", job_id))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}/api/v1/download/{}", self.public_base_url, job_id))
    }
}
