use crate::common::error::{JobError, Result};
use crate::infrastructure::storage::local::{remove_file_if_exists, StorageService};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archives a job's working directory into `<archive_dir>/<id>.zip`.
#[derive(Clone)]
pub struct Packager {
    storage: StorageService,
}

impl Packager {
    pub fn new(storage: StorageService) -> Self {
        Self { storage }
    }

    /// Must only be called after orchestration succeeded. The archive is
    /// staged under a `.part` name and renamed into place when complete; on
    /// failure the partial file is removed and the working directory is left
    /// untouched.
    pub async fn package(&self, job_id: &str) -> Result<PathBuf> {
        let work_dir = self.storage.work_dir(job_id);
        let partial = self.storage.partial_archive_path(job_id);
        let target = self.storage.archive_path(job_id);

        let staged = partial.clone();
        let written = tokio::task::spawn_blocking(move || write_zip(&work_dir, &staged))
            .await
            .map_err(JobError::packaging)?;

        let result = match written {
            Ok(entries) => tokio::fs::rename(&partial, &target)
                .await
                .map(|_| entries)
                .map_err(JobError::packaging),
            Err(e) => Err(JobError::packaging(e)),
        };

        match result {
            Ok(entries) => {
                info!(job_id, entries, "📦 Archive written to {}", target.display());
                Ok(target)
            }
            Err(e) => {
                if let Err(rm) = remove_file_if_exists(&partial).await {
                    warn!(job_id, "Failed to remove partial archive {}: {}", partial.display(), rm);
                }
                Err(e)
            }
        }
    }
}

/// Writes every file under `root` at its path relative to `root`, using `/`
/// separators. Returns the number of file entries.
fn write_zip(root: &Path, destination: &Path) -> io::Result<usize> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("working directory {} does not exist", root.display()),
        ));
    }

    let file = File::create(destination)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
                continue;
            }

            let name = archive_name(root, &path)?;
            zip.start_file(name, options).map_err(io::Error::other)?;
            let mut source = File::open(&path)?;
            io::copy(&mut source, &mut zip)?;
            entries += 1;
        }
    }

    let mut writer = zip.finish().map_err(io::Error::other)?;
    io::Write::flush(&mut writer)?;
    Ok(entries)
}

fn archive_name(root: &Path, path: &Path) -> io::Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
