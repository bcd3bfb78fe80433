//! Streaming of remote file content to disk
//!
//! This module provides functionality for:
//! - Streaming HTTP responses to files with progress tracking
//! - Downloading URLs into a caller-provided path
//! - Staging remote files in scratch directories removed on drop

use std::path::{Path, PathBuf};

use futures::StreamExt;
use lazy_static::lazy_static;
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, ZenodoError};
use crate::file::entity::REMOTE_SCHEMES;
use crate::progress::setup_progress_log;

lazy_static! {
    /// Client for URLs outside of the API, which must not receive the token.
    pub(crate) static ref HTTP: reqwest::Client = reqwest::Client::new();
}

/// Streams the body of a response into `out_path`.
///
/// Parent directories are created as needed.
///
/// # Arguments
///
/// * `out_path` - Path of the file to write.
/// * `response` - The response whose body is written.
/// * `progress` - Whether to display a progress bar.
pub(crate) async fn stream_file(
    out_path: &Path,
    response: reqwest::Response,
    progress: bool,
) -> Result<PathBuf> {
    create_dirs_from_path(out_path).await?;
    let mut file = File::create(out_path).await?;

    let pb = if progress {
        let name = out_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        setup_progress_log(response.content_length().unwrap_or(0), None, &name)
    } else {
        indicatif::ProgressBar::hidden()
    };

    let mut stream = response.bytes_stream();
    while let Some(item) = stream.next().await {
        let chunk = item?;
        file.write_all(&chunk).await?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    pb.finish_and_clear();

    Ok(out_path.to_path_buf())
}

/// Downloads a URL into `dest`.
///
/// # Errors
///
/// Fails with [`ZenodoError::InvalidArgument`] if the URL is not HTTP(S), or
/// with the transport error if the server answers with a failure status.
pub async fn download_file(url: &str, dest: &Path, progress: bool) -> Result<PathBuf> {
    if !REMOTE_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(ZenodoError::InvalidArgument(format!(
            "URL '{url}' is invalid"
        )));
    }

    tracing::debug!(%url, dest = %dest.display(), "downloading");
    let response = HTTP.get(url).send().await?.error_for_status()?;
    stream_file(dest, response, progress).await
}

/// Creates all necessary parent directories for a given file path.
pub(crate) async fn create_dirs_from_path(out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// A remote file downloaded into a private scratch directory.
///
/// The directory and its content are removed when the value is dropped,
/// whichever way the owning operation ends.
#[derive(Debug)]
pub struct StagedFile {
    _dir: TempDir,
    path: PathBuf,
}

impl StagedFile {
    /// Downloads `url` into a fresh scratch directory under `filename`.
    pub async fn download(url: &str, filename: &str, progress: bool) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(".zen").tempdir()?;
        let path = dir.path().join(filename);
        download_file(url, &path, progress).await?;

        Ok(StagedFile { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
