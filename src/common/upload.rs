use crate::common::error::{JobError, Result};
use crate::infrastructure::storage::local::remove_file_if_exists;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info, warn};

/// A client-supplied file name reduced to a safe stem plus an allow-listed extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadName {
    pub stem: String,
    pub extension: String,
}

impl UploadName {
    /// Holding-area name: original stem plus the job id as uniqueness suffix.
    pub fn stored_name(&self, job_id: &str) -> String {
        format!("{}_{}.{}", self.stem, job_id, self.extension)
    }
}

pub fn validate_filename(filename: &str, allowed: &[String]) -> Result<UploadName> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let Some((stem, extension)) = base.rsplit_once('.') else {
        return Err(JobError::validation(format!(
            "File `{}` has no extension. Supported formats: {}",
            filename,
            allowed.join(", ")
        )));
    };

    let extension = extension.to_ascii_lowercase();
    if !allowed.iter().any(|a| *a == extension) {
        return Err(JobError::validation(format!(
            "File type `{}` is not allowed. Supported formats: {}",
            extension,
            allowed.join(", ")
        )));
    }

    let stem: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    let stem = if stem.trim_matches('_').is_empty() { "video".to_string() } else { stem };

    Ok(UploadName { stem, extension })
}

/// Writes an upload to disk through a fixed-size buffer so memory use does not
/// grow with the payload.
pub struct DiskUploader {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl DiskUploader {
    pub async fn new(path: PathBuf, chunk_size: usize) -> Result<Self> {
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::with_capacity(chunk_size, file),
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.writer.write_all(&chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<u64> {
        self.writer.flush().await?;
        self.writer.get_mut().sync_all().await?;
        Ok(self.written)
    }

    pub async fn abort(self) {
        let Self { path, writer, .. } = self;
        drop(writer);
        if let Err(e) = remove_file_if_exists(&path).await {
            warn!("Failed to remove partial upload {}: {}", path.display(), e);
        }
    }
}

/// Error type of an upload body stream.
pub trait UploadStreamError: Display {
    /// The body was cut off by the request size limit.
    fn exceeded_limit(&self) -> bool {
        false
    }
}

impl UploadStreamError for std::io::Error {}

impl UploadStreamError for MultipartError {
    fn exceeded_limit(&self) -> bool {
        self.status() == StatusCode::PAYLOAD_TOO_LARGE
    }
}

pub async fn stream_to_disk<S, E>(stream: S, path: &Path, chunk_size: usize) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: UploadStreamError,
{
    let mut stream = std::pin::pin!(stream);
    let mut uploader = DiskUploader::new(path.to_path_buf(), chunk_size).await?;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Upload stream error: {}", e);
                uploader.abort().await;
                if e.exceeded_limit() {
                    return Err(JobError::PayloadTooLarge);
                }
                return Err(JobError::validation(format!("Upload interrupted: {}", e)));
            }
        };

        if let Err(e) = uploader.write_chunk(chunk).await {
            error!("Upload write error: {}", e);
            uploader.abort().await;
            return Err(e);
        }
    }

    let written = match uploader.finish().await {
        Ok(n) => n,
        Err(e) => {
            error!("Upload flush error: {}", e);
            if let Err(rm) = remove_file_if_exists(path).await {
                warn!("Failed to remove partial upload {}: {}", path.display(), rm);
            }
            return Err(e);
        }
    };
    info!("⬆️ Stored {} bytes at {}", written, path.display());
    Ok(written)
}
