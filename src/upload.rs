//! Synchronization of local files into a remote file set.
//!
//! Each file is processed on its own:
//! - its size and modification date are refreshed,
//! - remote files without checksum are downloaded into a scratch directory,
//! - the MD5 checksum is computed when unknown,
//! - the file is created remotely unless a matching one already exists,
//!   retrying failed attempts after a randomized delay.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::deposition::DepositionFiles;
use crate::error::{Result, ZenodoError};
use crate::file::filestream::StagedFile;
use crate::file::hasher::Md5Hasher;
use crate::file::{FileEntity, FileSet};
use crate::progress::setup_batch_progress;

/// Bounds of the retry loop around remote file creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 15,
            min_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Source of the delays waited between two upload attempts.
pub trait Backoff {
    /// Delay to wait after the failed `attempt` (starting at 1).
    fn delay(&mut self, attempt: usize, policy: &RetryPolicy) -> Duration;
}

/// Uniformly random delays within the policy bounds.
#[derive(Debug)]
pub struct RandomBackoff {
    rng: StdRng,
}

impl RandomBackoff {
    pub fn new() -> Self {
        RandomBackoff {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible delays, for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        RandomBackoff {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff for RandomBackoff {
    fn delay(&mut self, _attempt: usize, policy: &RetryPolicy) -> Duration {
        let min = policy.min_delay.as_millis() as u64;
        let max = policy.max_delay.as_millis() as u64;
        if max <= min {
            return policy.min_delay;
        }
        Duration::from_millis(self.rng.gen_range(min..=max))
    }
}

/// Retries immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Backoff for NoDelay {
    fn delay(&mut self, _attempt: usize, _policy: &RetryPolicy) -> Duration {
        Duration::ZERO
    }
}

pub struct UploadOptions {
    /// Upload files even when the remote set already has a matching one.
    pub force: bool,
    pub progress: bool,
    pub retry: RetryPolicy,
    pub backoff: Box<dyn Backoff + Send>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            force: false,
            progress: true,
            retry: RetryPolicy::default(),
            backoff: Box::new(RandomBackoff::new()),
        }
    }
}

/// Counters of an upload batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub uploaded: usize,
    pub skipped: usize,
}

/// The remote side of an upload.
#[allow(async_fn_in_trait)]
pub trait RemoteFiles {
    /// Whether a file with the same name and a compatible checksum exists.
    async fn contains(&mut self, file: &FileEntity) -> Result<bool>;

    /// Creates `filename` remotely with the content of `path`.
    async fn create(&mut self, path: &Path, filename: &str, progress: bool) -> Result<()>;

    /// Lists the remote files again.
    async fn reload(&mut self) -> Result<()>;
}

impl RemoteFiles for DepositionFiles {
    async fn contains(&mut self, file: &FileEntity) -> Result<bool> {
        DepositionFiles::contains(self, file).await
    }

    async fn create(&mut self, path: &Path, filename: &str, progress: bool) -> Result<()> {
        let outcome = self.put(path, filename, progress).await;
        self.invalidate();
        match outcome {
            Err(err) if err.is_malformed_response() => Ok(()),
            outcome => outcome,
        }
    }

    async fn reload(&mut self) -> Result<()> {
        self.list().await.map(|_| ())
    }
}

/// Synchronizes one file, returning whether it was created remotely.
///
/// The checksum, size and date of `file` are updated along the way. Scratch
/// copies of remote files are removed before returning.
pub async fn upload_file<R: RemoteFiles>(
    file: &mut FileEntity,
    remote: &mut R,
    options: &mut UploadOptions,
) -> Result<bool> {
    file.refresh_metadata().await?;
    tracing::info!(locator = file.locator(), "processing file");

    let mut staged = None;
    if file.is_remote() && file.checksum().is_none() {
        staged = Some(stage(file, options.progress).await?);
    }

    if file.checksum().is_none() {
        let checksum = Md5Hasher::hash_file(content_path(file, staged.as_ref())).await?;
        file.set_checksum(Some(checksum));
    }

    if !options.force && remote.contains(file).await? {
        tracing::debug!(filename = file.filename(), "already uploaded");
        return Ok(false);
    }

    if file.is_remote() && staged.is_none() {
        staged = Some(stage(file, options.progress).await?);
    }
    let path = content_path(file, staged.as_ref());

    let mut attempts = 0;
    loop {
        let outcome = remote.create(&path, file.filename(), options.progress).await;
        attempts += 1;

        let err = match outcome {
            Ok(()) => return Ok(true),
            Err(err) => err,
        };

        tracing::warn!(
            filename = file.filename(),
            attempt = attempts,
            error = %err,
            "upload attempt failed"
        );
        if attempts > options.retry.max_retries {
            return Err(ZenodoError::UploadFailed {
                filename: file.filename().to_string(),
                attempts,
                source: Box::new(err),
            });
        }

        let delay = options.backoff.delay(attempts, &options.retry);
        if !delay.is_zero() {
            tracing::info!(seconds = delay.as_secs(), "retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Synchronizes every file of the set, in order, stopping at the first
/// failure.
pub async fn upload_files<R: RemoteFiles>(
    files: &mut FileSet,
    remote: &mut R,
    options: &mut UploadOptions,
) -> Result<UploadReport> {
    let pb = setup_batch_progress(files.len(), options.progress);
    let mut report = UploadReport::default();

    for file in files.iter_mut() {
        pb.set_message(file.filename().to_string());
        if upload_file(file, remote, options).await? {
            report.uploaded += 1;
        } else {
            report.skipped += 1;
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(report)
}

async fn stage(file: &FileEntity, progress: bool) -> Result<StagedFile> {
    StagedFile::download(file.locator(), file.filename(), progress).await
}

fn content_path(file: &FileEntity, staged: Option<&StagedFile>) -> PathBuf {
    match staged {
        Some(staged) => staged.path().to_path_buf(),
        None => PathBuf::from(file.locator()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use httpmock::prelude::*;

    use super::*;

    /// Remote set kept in memory, failing a fixed number of creates first.
    #[derive(Default)]
    pub(crate) struct MemoryRemote {
        pub files: HashMap<String, String>,
        pub creates: usize,
        pub failures: usize,
        pub reloads: usize,
    }

    impl RemoteFiles for MemoryRemote {
        async fn contains(&mut self, file: &FileEntity) -> Result<bool> {
            Ok(match (self.files.get(file.filename()), file.checksum()) {
                (Some(stored), Some(checksum)) => stored == checksum,
                (Some(_), None) => true,
                (None, _) => false,
            })
        }

        async fn create(&mut self, path: &Path, filename: &str, _progress: bool) -> Result<()> {
            self.creates += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(ZenodoError::InvalidArgument("connection reset".to_string()));
            }
            let checksum = Md5Hasher::hash_file(path).await?;
            self.files.insert(filename.to_string(), checksum);
            Ok(())
        }

        async fn reload(&mut self) -> Result<()> {
            self.reloads += 1;
            Ok(())
        }
    }

    pub(crate) fn options(max_retries: usize) -> UploadOptions {
        UploadOptions {
            force: false,
            progress: false,
            retry: RetryPolicy {
                max_retries,
                ..Default::default()
            },
            backoff: Box::new(NoDelay),
        }
    }

    fn local_set(dir: &Path, names: &[&str]) -> FileSet {
        let locators = names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, format!("content of {name}")).unwrap();
                path.to_str().unwrap().to_string()
            })
            .collect::<Vec<_>>();
        FileSet::from_locators(locators).unwrap()
    }

    #[tokio::test]
    async fn test_second_upload_creates_nothing() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let mut files = local_set(dir.path(), &["a.txt", "b.txt"]);
        let mut remote = MemoryRemote::default();
        let mut options = options(0);

        // Act
        let first = upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap();
        let second = upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap();

        // Assert
        assert_eq!(first.uploaded, 2);
        assert_eq!(second, UploadReport { uploaded: 0, skipped: 2 });
        assert_eq!(remote.creates, 2);
    }

    #[tokio::test]
    async fn test_force_uploads_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = local_set(dir.path(), &["a.txt"]);
        let mut remote = MemoryRemote::default();
        let mut options = options(0);

        upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap();
        options.force = true;
        upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap();

        assert_eq!(remote.creates, 2);
    }

    #[tokio::test]
    async fn test_changed_file_is_uploaded_again() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let mut files = local_set(dir.path(), &["a.txt"]);
        let mut remote = MemoryRemote::default();
        let mut options = options(0);
        upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap();

        // Act
        std::fs::write(dir.path().join("a.txt"), "a longer new content").unwrap();
        let report = upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap();

        // Assert
        assert_eq!(report.uploaded, 1);
        assert_eq!(remote.creates, 2);
    }

    #[tokio::test]
    async fn test_retries_within_bound_succeed() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let mut files = local_set(dir.path(), &["a.txt"]);
        let mut remote = MemoryRemote {
            failures: 3,
            ..Default::default()
        };
        let mut options = options(3);

        // Act
        let report = upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap();

        // Assert
        assert_eq!(report.uploaded, 1);
        assert_eq!(remote.creates, 4);
    }

    #[tokio::test]
    async fn test_two_failures_then_success() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let mut files = local_set(dir.path(), &["a.txt"]);
        let mut remote = MemoryRemote {
            failures: 2,
            ..Default::default()
        };
        let mut options = options(3);

        // Act
        let report = upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap();

        // Assert
        assert_eq!(report, UploadReport { uploaded: 1, skipped: 0 });
        assert_eq!(remote.creates, 3);
        assert!(remote.files.contains_key("a.txt"));
    }

    #[tokio::test]
    async fn test_retries_exhausted_fail() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let mut files = local_set(dir.path(), &["a.txt", "b.txt"]);
        let mut remote = MemoryRemote {
            failures: 4,
            ..Default::default()
        };
        let mut options = options(3);

        // Act
        let err = upload_files(&mut files, &mut remote, &mut options)
            .await
            .unwrap_err();

        // Assert
        match err {
            ZenodoError::UploadFailed {
                filename, attempts, ..
            } => {
                assert_eq!(filename, "a.txt");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(remote.creates, 4);
        assert!(remote.files.is_empty());
    }

    #[tokio::test]
    async fn test_remote_file_is_staged_and_hashed() {
        // Arrange
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/data/file.csv");
            then.status(200).body("1,2,3");
        });
        server.mock(|when, then| {
            when.method(httpmock::Method::HEAD).path("/data/file.csv");
            then.status(200);
        });
        let mut file = FileEntity::from_locator(&server.url("/data/file.csv")).unwrap();
        let mut remote = MemoryRemote::default();
        let mut options = options(0);

        // Act
        let created = upload_file(&mut file, &mut remote, &mut options)
            .await
            .unwrap();

        // Assert
        mock.assert();
        assert!(created);
        let expected = format!("{:x}", md5::compute("1,2,3"));
        assert_eq!(file.checksum(), Some(expected.as_str()));
        assert_eq!(remote.files["file.csv"], expected);
    }

    #[test]
    fn test_seeded_backoff_stays_in_bounds() {
        let policy = RetryPolicy::default();
        let mut backoff = RandomBackoff::seeded(7);

        for attempt in 1..=50 {
            let delay = backoff.delay(attempt, &policy);
            assert!(delay >= policy.min_delay && delay <= policy.max_delay);
        }
    }

    #[test]
    fn test_seeded_backoff_is_reproducible() {
        let policy = RetryPolicy::default();
        let mut left = RandomBackoff::seeded(42);
        let mut right = RandomBackoff::seeded(42);

        let left = (1..10).map(|i| left.delay(i, &policy)).collect::<Vec<_>>();
        let right = (1..10).map(|i| right.delay(i, &policy)).collect::<Vec<_>>();

        assert_eq!(left, right);
    }
}
