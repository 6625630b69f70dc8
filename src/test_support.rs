use crate::common::error::{JobError, Result};
use crate::config::settings::{parse_profiles, AppConfig, ProcessingMode, SmtpSettings, DEFAULT_PROFILES};
use crate::infrastructure::encoder::ffmpeg::{EncodeRequest, Encoder};
use crate::infrastructure::mail::smtp::Notifier;
use crate::modules::jobs::events::TranscodeJob;
use crate::state::AppState;
use async_channel::Receiver;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Stand-in for ffmpeg: writes a sub-playlist and two segments per
/// rendition, fails on the named profiles and records every invocation.
#[derive(Default)]
pub struct ScriptedEncoder {
    fail_on: Vec<String>,
    silent: bool,
    delay: Duration,
    invoked: Mutex<Vec<String>>,
}

impl ScriptedEncoder {
    pub fn failing_on(profiles: &[&str]) -> Self {
        Self {
            fail_on: profiles.iter().map(|p| p.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Succeeds without writing anything.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Takes `delay` per rendition before producing output.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for ScriptedEncoder {
    async fn encode(&self, request: &EncodeRequest) -> std::result::Result<(), String> {
        let profile = request
            .output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.invoked.lock().unwrap().push(profile.clone());
        tokio::time::sleep(self.delay).await;

        // Leave a partial segment behind, as a crashing encoder would.
        std::fs::write(request.output_dir.join("segment_000.ts"), b"partial").map_err(|e| e.to_string())?;

        if self.fail_on.contains(&profile) {
            return Err(format!("scripted failure for {}", profile));
        }
        if self.silent {
            return Ok(());
        }

        std::fs::write(request.output_dir.join("segment_000.ts"), format!("{}-0", profile)).map_err(|e| e.to_string())?;
        std::fs::write(request.output_dir.join("segment_001.ts"), format!("{}-1", profile)).map_err(|e| e.to_string())?;
        let playlist = format!(
            "#EXTM3U\n#EXT-X-TARGETDURATION:{d}\n#EXTINF:{d}.0,\nsegment_000.ts\n#EXTINF:{d}.0,\nsegment_001.ts\n#EXT-X-ENDLIST\n",
            d = request.segment_duration
        );
        std::fs::write(request.playlist_path(), playlist).map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), html_body.to_string()));
        if self.fail {
            return Err(JobError::Notification("smtp unreachable".to_string()));
        }
        Ok(())
    }
}

pub fn test_config(root: &Path, mode: ProcessingMode) -> AppConfig {
    AppConfig {
        server_port: 0,
        upload_dir: root.join("videos"),
        output_dir: root.join("outputs"),
        archive_dir: root.join("zips"),
        allowed_extensions: vec!["mp4".into(), "avi".into(), "mov".into()],
        profiles: parse_profiles(DEFAULT_PROFILES, 10).unwrap(),
        audio_codec: "aac".into(),
        encoder_bin: "ffmpeg".into(),
        archive_ttl: Duration::from_secs(3600),
        sweep_interval: Duration::from_secs(3600),
        public_base_url: Url::parse("http://media.test").unwrap(),
        processing_mode: mode,
        max_concurrent_jobs: 2,
        queue_capacity: 8,
        max_upload_bytes: 16 * 1024 * 1024,
        upload_chunk_bytes: 64 * 1024,
        smtp: SmtpSettings {
            host: String::new(),
            port: 587,
            username: None,
            password: None,
            from: "HLS Forge <noreply@localhost>".into(),
            tls: true,
        },
    }
}

pub async fn test_state(
    config: AppConfig,
    encoder: Arc<ScriptedEncoder>,
    notifier: Arc<RecordingNotifier>,
) -> (AppState, Receiver<TranscodeJob>) {
    let (state, receiver) = AppState::new(config, encoder, notifier);
    state.storage.ensure_dirs().await.unwrap();
    (state, receiver)
}

/// Builds a multipart body with text fields first and the video last.
pub fn multipart_body(boundary: &str, fields: &[(&str, &str)], video: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    if let Some((file_name, data)) = video {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{file_name}\"\r\nContent-Type: video/mp4\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

pub fn read_zip<R: Read + Seek>(reader: R) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(reader).unwrap();
    let mut files = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        if entry.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        files.insert(entry.name().to_string(), data);
    }
    files
}

/// Every file under `root`, keyed by its `/`-separated relative path.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                let key: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
                files.insert(key.join("/"), std::fs::read(&path).unwrap());
            }
        }
    }
    files
}
