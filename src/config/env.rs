use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    UploadDir,
    OutputDir,
    ArchiveDir,
    AllowedExtensions,
    RenditionProfiles,
    SegmentDuration,
    AudioCodec,
    EncoderBin,
    ArchiveTtl,
    SweepInterval,
    PublicBaseUrl,
    ProcessingMode,
    MaxConcurrentJobs,
    QueueCapacity,
    MaxUploadBytes,
    UploadChunkBytes,
    SmtpHost,
    SmtpPort,
    SmtpUsername,
    SmtpPassword,
    SmtpFrom,
    SmtpTls,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::UploadDir => "UPLOAD_DIR",
            EnvKey::OutputDir => "OUTPUT_DIR",
            EnvKey::ArchiveDir => "ARCHIVE_DIR",
            EnvKey::AllowedExtensions => "ALLOWED_EXTENSIONS",
            EnvKey::RenditionProfiles => "RENDITION_PROFILES",
            EnvKey::SegmentDuration => "SEGMENT_DURATION_SECS",
            EnvKey::AudioCodec => "AUDIO_CODEC",
            EnvKey::EncoderBin => "ENCODER_BIN",
            EnvKey::ArchiveTtl => "ARCHIVE_TTL_SECS",
            EnvKey::SweepInterval => "SWEEP_INTERVAL_SECS",
            EnvKey::PublicBaseUrl => "PUBLIC_BASE_URL",
            EnvKey::ProcessingMode => "PROCESSING_MODE",
            EnvKey::MaxConcurrentJobs => "MAX_CONCURRENT_JOBS",
            EnvKey::QueueCapacity => "QUEUE_CAPACITY",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::UploadChunkBytes => "UPLOAD_CHUNK_BYTES",
            EnvKey::SmtpHost => "SMTP_HOST",
            EnvKey::SmtpPort => "SMTP_PORT",
            EnvKey::SmtpUsername => "SMTP_USERNAME",
            EnvKey::SmtpPassword => "SMTP_PASSWORD",
            EnvKey::SmtpFrom => "SMTP_FROM",
            EnvKey::SmtpTls => "SMTP_TLS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

/// Unset and empty variables both yield `None`.
pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
