use crate::config::settings::Resolution;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Everything the external encoder needs for one rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub resolution: Resolution,
    pub video_bitrate: String,
    pub audio_codec: String,
    pub segment_duration: u32,
    pub output_dir: PathBuf,
    pub playlist_name: String,
}

impl EncodeRequest {
    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(&self.playlist_name)
    }
}

/// External encoder contract: write segments plus a sub-playlist into
/// `output_dir`, or fail with a human-readable detail.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, request: &EncodeRequest) -> Result<(), String>;
}

/// Lines of stderr kept as the failure detail.
const STDERR_TAIL_LINES: usize = 8;

pub struct FfmpegEncoder {
    bin: String,
}

impl FfmpegEncoder {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn args(request: &EncodeRequest) -> Vec<String> {
        let segment_pattern = request.output_dir.join("segment_%03d.ts");
        vec![
            "-y".into(),
            "-i".into(),
            request.input.to_string_lossy().into_owned(),
            "-vf".into(),
            format!("scale={}:{}", request.resolution.width, request.resolution.height),
            "-c:v".into(),
            "libx264".into(),
            "-b:v".into(),
            request.video_bitrate.clone(),
            "-c:a".into(),
            request.audio_codec.clone(),
            "-hls_time".into(),
            request.segment_duration.to_string(),
            "-hls_playlist_type".into(),
            "vod".into(),
            "-hls_segment_filename".into(),
            segment_pattern.to_string_lossy().into_owned(),
            "-f".into(),
            "hls".into(),
            request.playlist_path().to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, request: &EncodeRequest) -> Result<(), String> {
        let args = Self::args(request);
        debug!("{} {}", self.bin, args.join(" "));

        let output = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to spawn {}: {}", self.bin, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(format!("{} exited with {}: {}", self.bin, output.status, tail));
        }

        info!(
            resolution = %request.resolution,
            bitrate = %request.video_bitrate,
            "🎬 Rendition encoded into {}",
            request.output_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EncodeRequest {
        EncodeRequest {
            input: PathBuf::from("videos/clip_1.mp4"),
            resolution: Resolution { width: 1280, height: 720 },
            video_bitrate: "2500k".into(),
            audio_codec: "aac".into(),
            segment_duration: 10,
            output_dir: PathBuf::from("outputs/1/720p"),
            playlist_name: "index.m3u8".into(),
        }
    }

    #[test]
    fn builds_hls_arguments_for_profile() {
        let args = FfmpegEncoder::args(&request());
        let joined = args.join(" ");
        assert!(joined.contains("-i videos/clip_1.mp4"));
        assert!(joined.contains("-vf scale=1280:720"));
        assert!(joined.contains("-b:v 2500k"));
        assert!(joined.contains("-c:a aac"));
        assert!(joined.contains("-hls_time 10"));
        assert_eq!(args.last().unwrap(), "outputs/1/720p/index.m3u8");
    }

    #[tokio::test]
    async fn missing_binary_is_an_encoding_failure() {
        let encoder = FfmpegEncoder::new("definitely-not-an-encoder-binary");
        let err = encoder.encode(&request()).await.unwrap_err();
        assert!(err.contains("failed to spawn"));
    }
}
