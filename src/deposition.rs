//! Refreshable views over remote depositions.
//!
//! A [`Deposition`] is a snapshot of one remote container. Mutating actions
//! never patch a snapshot in place: they return the snapshot built from the
//! server answer, and the caller keeps the latest one. The files of a
//! deposition are exposed through [`DepositionFiles`], a cached listing that
//! is invalidated by every write and listed again on the next read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::client::BaseClient;
use crate::error::{Result, ZenodoError};
use crate::file::filestream::{download_file, StagedFile};
use crate::file::{FileEntity, FileSet};
use crate::metadata::Metadata;
use crate::native_api::deposition::{
    create_deposition, delete_deposition, discard_deposition, edit_deposition,
    get_deposition_bucket, list_depositions, new_version_deposition, publish_deposition,
    retrieve_deposition, update_deposition, DepositionQuery, DepositionRecord, DepositionState,
};
use crate::native_api::files::{
    checksum_deposition_file, create_deposition_file, delete_deposition_file,
    list_deposition_files, retrieve_deposition_file,
};
use crate::utils::validate_directory;

/// Entry point to the depositions of the authenticated account.
#[derive(Debug, Clone)]
pub struct Depositions {
    client: BaseClient,
}

impl Depositions {
    pub fn new(client: BaseClient) -> Self {
        Depositions { client }
    }

    /// Lists every deposition matching the query.
    ///
    /// Pages are requested one after the other, starting at `query.page`
    /// (or the first page), until the server answers with an empty one.
    pub async fn list(&self, query: &DepositionQuery) -> Result<Vec<Deposition>> {
        let mut query = query.clone();
        let mut page = query.page.unwrap_or(1);
        let mut depositions = Vec::new();

        loop {
            query.page = Some(page);
            let records = list_depositions(&self.client, &query).await?;
            if records.is_empty() {
                break;
            }

            tracing::debug!(page, count = records.len(), "listed depositions");
            for record in records {
                depositions.push(Deposition::from_record(self.client.clone(), record)?);
            }
            page += 1;
        }

        Ok(depositions)
    }

    /// Creates a new draft deposition with raw metadata.
    pub async fn create(&self, metadata: Option<Value>) -> Result<Deposition> {
        let record = create_deposition(&self.client, metadata).await?;
        tracing::info!(id = record.id, "created deposition");
        Deposition::from_record(self.client.clone(), record)
    }

    /// Creates a new draft deposition, rendering the metadata first.
    pub async fn create_with_metadata(
        &self,
        metadata: &Metadata,
        replacements: &HashMap<String, Value>,
    ) -> Result<Deposition> {
        let rendered = metadata.render(replacements)?;
        self.create(Some(rendered)).await
    }

    pub async fn retrieve(&self, id: i64) -> Result<Deposition> {
        let record = retrieve_deposition(&self.client, id).await?;
        Deposition::from_record(self.client.clone(), record)
    }
}

/// Snapshot of a remote deposition and of its files.
#[derive(Debug, Clone)]
pub struct Deposition {
    client: BaseClient,
    record: DepositionRecord,
    files: DepositionFiles,
}

impl Deposition {
    pub(crate) fn from_record(client: BaseClient, record: DepositionRecord) -> Result<Self> {
        let files = DepositionFiles {
            client: client.clone(),
            deposition_id: record.id,
            bucket: record.link("bucket").map(str::to_string),
            files: FileSet::new(record.files.clone())?,
            invalidated: false,
        };

        Ok(Deposition {
            client,
            record,
            files,
        })
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    /// The DOI, or the one reserved for the deposition while unpublished.
    pub fn doi(&self) -> Option<String> {
        self.record.doi()
    }

    pub fn concept_id(&self) -> Option<String> {
        self.record.concept_id()
    }

    pub fn title(&self) -> Option<&str> {
        self.record
            .title
            .as_deref()
            .or_else(|| self.record.metadata.get("title").and_then(Value::as_str))
    }

    pub fn state(&self) -> Option<DepositionState> {
        self.record.state
    }

    /// True while files and metadata can be changed.
    pub fn is_editing(&self) -> bool {
        !self.record.submitted || self.record.state == Some(DepositionState::InProgress)
    }

    pub fn is_published(&self) -> bool {
        self.record.submitted
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.record.metadata
    }

    pub fn link(&self, name: &str) -> Option<&str> {
        self.record.link(name)
    }

    pub fn bucket(&self) -> Option<&str> {
        self.record.link("bucket")
    }

    pub fn record(&self) -> &DepositionRecord {
        &self.record
    }

    pub fn client(&self) -> &BaseClient {
        &self.client
    }

    pub fn files(&self) -> &DepositionFiles {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut DepositionFiles {
        &mut self.files
    }

    /// Retrieves the deposition again.
    pub async fn refresh(&self) -> Result<Deposition> {
        let record = retrieve_deposition(&self.client, self.id()).await?;
        Deposition::from_record(self.client.clone(), record)
    }

    /// Replaces the metadata of the deposition.
    ///
    /// Sends the current metadata back when `metadata` is `None`.
    pub async fn update(&self, metadata: Option<Value>) -> Result<Deposition> {
        let metadata =
            metadata.unwrap_or_else(|| Value::Object(self.record.metadata.clone()));
        let outcome = update_deposition(&self.client, self.id(), metadata).await;
        self.renew(outcome)
    }

    /// Renders `metadata` with `replacements` and replaces the metadata of
    /// the deposition with the result.
    pub async fn update_with_metadata(
        &self,
        metadata: &Metadata,
        replacements: &HashMap<String, Value>,
    ) -> Result<Deposition> {
        let rendered = metadata.render(replacements)?;
        self.update(Some(rendered)).await
    }

    pub async fn publish(&self) -> Result<Deposition> {
        let outcome = publish_deposition(&self.client, self.id()).await;
        self.renew(outcome)
    }

    pub async fn edit(&self) -> Result<Deposition> {
        let outcome = edit_deposition(&self.client, self.id()).await;
        self.renew(outcome)
    }

    pub async fn discard(&self) -> Result<Deposition> {
        let outcome = discard_deposition(&self.client, self.id()).await;
        self.renew(outcome)
    }

    /// Creates a new version and returns its draft.
    pub async fn new_version(&self) -> Result<Deposition> {
        let outcome = new_version_deposition(&self.client, self.id()).await;
        self.renew(outcome)
    }

    /// Deletes the deposition. Only drafts can be deleted.
    pub async fn delete(&self) -> Result<()> {
        match delete_deposition(&self.client, self.id()).await {
            Err(err) if err.is_malformed_response() => Ok(()),
            outcome => outcome,
        }
    }

    /// Whether the deposition holds a file matching `file`.
    pub async fn contains(&mut self, file: &FileEntity) -> Result<bool> {
        self.files.contains(file).await
    }

    fn renew(&self, outcome: Result<DepositionRecord>) -> Result<Deposition> {
        match outcome {
            Ok(record) => Deposition::from_record(self.client.clone(), record),
            Err(err) if err.is_malformed_response() => {
                tracing::debug!(id = self.id(), error = %err, "keeping previous snapshot");
                let mut deposition = self.clone();
                deposition.files.invalidate();
                Ok(deposition)
            }
            Err(err) => Err(err),
        }
    }
}

/// Cached listing of the files of a deposition.
#[derive(Debug, Clone)]
pub struct DepositionFiles {
    client: BaseClient,
    deposition_id: i64,
    bucket: Option<String>,
    files: FileSet,
    invalidated: bool,
}

impl DepositionFiles {
    pub fn deposition_id(&self) -> i64 {
        self.deposition_id
    }

    /// Replaces the cached files with a fresh listing.
    pub async fn list(&mut self) -> Result<&FileSet> {
        self.fetch().await?;
        Ok(&self.files)
    }

    /// The files, listed again first if the cache was invalidated.
    ///
    /// A listing answered with a malformed body keeps the cached files and
    /// the cache stays invalidated.
    pub async fn files(&mut self) -> Result<&FileSet> {
        self.revalidate().await?;
        Ok(&self.files)
    }

    /// The cached files, without contacting the server.
    pub fn cached(&self) -> &FileSet {
        &self.files
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub async fn contains(&mut self, file: &FileEntity) -> Result<bool> {
        self.revalidate().await?;
        Ok(self.files.contains(file))
    }

    pub async fn storage_size(&mut self) -> Result<u64> {
        self.revalidate().await?;
        Ok(self.files.storage_size())
    }

    /// Uploads a file into the bucket of the deposition.
    ///
    /// Remote locators are first downloaded into a scratch directory. The
    /// cache is invalidated whatever the outcome.
    ///
    /// # Arguments
    ///
    /// * `locator` - Local path or URL of the file.
    /// * `bucket_filename` - Name in the bucket, the base name of the locator
    ///   when `None`.
    /// * `progress` - Whether to display progress bars.
    pub async fn create(
        &mut self,
        locator: &str,
        bucket_filename: Option<&str>,
        progress: bool,
    ) -> Result<()> {
        let entity = FileEntity::from_locator(locator)?;
        let name = bucket_filename.unwrap_or(entity.filename()).to_string();

        let outcome = if entity.is_remote() {
            match StagedFile::download(locator, entity.filename(), progress).await {
                Ok(staged) => self.put(staged.path(), &name, progress).await,
                Err(err) => Err(err),
            }
        } else if entity.is_local() {
            self.put(Path::new(locator), &name, progress).await
        } else {
            Err(ZenodoError::InvalidFile(locator.to_string()))
        };

        self.invalidate();
        tolerate_malformed(outcome)
    }

    /// Deletes a file of the deposition and invalidates the cache.
    pub async fn delete(&mut self, file: &FileEntity) -> Result<()> {
        let outcome = match file.self_link() {
            Some(self_link) => delete_deposition_file(&self.client, self_link).await,
            None => Err(ZenodoError::InvalidArgument(format!(
                "File '{}' has no 'self' link",
                file.filename()
            ))),
        };

        self.invalidate();
        tolerate_malformed(outcome)
    }

    /// Retrieves the current state of a deposition file.
    pub async fn retrieve(&self, file: &FileEntity) -> Result<FileEntity> {
        let self_link = file.self_link().ok_or_else(|| {
            ZenodoError::InvalidArgument(format!("File '{}' has no 'self' link", file.filename()))
        })?;
        retrieve_deposition_file(&self.client, self_link).await
    }

    /// MD5 checksum of a deposition file.
    pub async fn checksum(&self, file: &FileEntity) -> Result<String> {
        checksum_deposition_file(&self.client, file).await
    }

    /// Downloads a deposition file into `dir`, the current directory when
    /// `None`.
    ///
    /// Files of unpublished drafts are only reachable with the access token,
    /// which is then added to the download URL.
    pub async fn download(
        &self,
        file: &FileEntity,
        dir: Option<&Path>,
        progress: bool,
    ) -> Result<PathBuf> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        validate_directory(&dir).await?;

        let url = if file.locator().contains("draft/files") {
            self.client.url_with_token(file.locator())?
        } else {
            file.locator().to_string()
        };

        download_file(&url, &dir.join(file.filename()), progress).await
    }

    pub(crate) async fn put(&mut self, path: &Path, name: &str, progress: bool) -> Result<()> {
        let bucket = self.bucket().await?;
        create_deposition_file(&self.client, &bucket, path, Some(name), progress).await?;
        tracing::info!(filename = name, deposition = self.deposition_id, "file uploaded");
        Ok(())
    }

    async fn bucket(&mut self) -> Result<String> {
        if let Some(bucket) = &self.bucket {
            return Ok(bucket.clone());
        }

        let record = retrieve_deposition(&self.client, self.deposition_id).await?;
        let bucket = get_deposition_bucket(&self.client, &record).await?;
        self.bucket = Some(bucket.clone());
        Ok(bucket)
    }

    async fn fetch(&mut self) -> Result<()> {
        let files = list_deposition_files(&self.client, self.deposition_id).await?;
        self.files = FileSet::new(files)?;
        self.invalidated = false;
        Ok(())
    }

    async fn revalidate(&mut self) -> Result<()> {
        if !self.invalidated {
            return Ok(());
        }
        tolerate_malformed(self.fetch().await)
    }
}

fn tolerate_malformed(outcome: Result<()>) -> Result<()> {
    match outcome {
        Err(err) if err.is_malformed_response() => {
            tracing::debug!(error = %err, "ignoring malformed response");
            Ok(())
        }
        outcome => outcome,
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn record_body(server: &MockServer, id: i64, submitted: bool, state: &str) -> Value {
        json!({
            "id": id,
            "state": state,
            "submitted": submitted,
            "title": "My dataset",
            "doi": "",
            "conceptrecid": "100",
            "metadata": {
                "title": "My dataset",
                "prereserve_doi": {"doi": format!("10.5281/zenodo.{id}")}
            },
            "links": {
                "bucket": server.url(format!("/api/files/bucket-{id}")),
                "html": server.url(format!("/deposit/{id}"))
            },
            "files": [file_body(server, id, "a.csv", "md5:aaa")]
        })
    }

    fn file_body(server: &MockServer, id: i64, name: &str, checksum: &str) -> Value {
        json!({
            "id": format!("file-{name}"),
            "filename": name,
            "filesize": 3,
            "checksum": checksum,
            "links": {
                "self": server.url(format!("/api/deposit/depositions/{id}/files/file-{name}")),
                "download": server.url(format!("/api/records/{id}/draft/files/{name}/content"))
            }
        })
    }

    async fn retrieved(server: &MockServer) -> Deposition {
        let body = record_body(server, 1, false, "unsubmitted");
        server.mock(|when, then| {
            when.method(GET).path("/api/deposit/depositions/1");
            then.status(200).json_body(body);
        });
        let client = BaseClient::new(&server.base_url(), Some(&"token".to_string())).unwrap();
        Depositions::new(client).retrieve(1).await.unwrap()
    }

    #[tokio::test]
    async fn test_accessors() {
        let server = MockServer::start();

        let deposition = retrieved(&server).await;

        assert_eq!(deposition.id(), 1);
        assert_eq!(deposition.doi().as_deref(), Some("10.5281/zenodo.1"));
        assert_eq!(deposition.concept_id().as_deref(), Some("100"));
        assert_eq!(deposition.title(), Some("My dataset"));
        assert!(deposition.is_editing());
        assert!(!deposition.is_published());
        assert_eq!(deposition.files().cached().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_returns_new_snapshot() {
        // Arrange
        let server = MockServer::start();
        let deposition = retrieved(&server).await;
        let published = record_body(&server, 1, true, "done");
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/deposit/depositions/1/actions/publish");
            then.status(202).json_body(published);
        });

        // Act
        let published = deposition.publish().await.unwrap();

        // Assert
        mock.assert();
        assert!(published.is_published());
        assert!(!published.is_editing());
        assert!(!deposition.is_published());
    }

    #[tokio::test]
    async fn test_empty_action_body_invalidates_files() {
        // Arrange
        let server = MockServer::start();
        let deposition = retrieved(&server).await;
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/deposit/depositions/1/actions/edit");
            then.status(202);
        });

        // Act
        let edited = deposition.edit().await.unwrap();

        // Assert
        assert_eq!(edited.id(), 1);
        assert!(edited.files().is_invalidated());
        assert!(!deposition.files().is_invalidated());
    }

    #[tokio::test]
    async fn test_update_sends_current_metadata() {
        // Arrange
        let server = MockServer::start();
        let deposition = retrieved(&server).await;
        let body = record_body(&server, 1, false, "unsubmitted");
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/api/deposit/depositions/1")
                .json_body(json!({"metadata": {
                    "title": "My dataset",
                    "prereserve_doi": {"doi": "10.5281/zenodo.1"}
                }}));
            then.status(200).json_body(body);
        });

        // Act
        let updated = deposition.update(None).await.unwrap();

        // Assert
        mock.assert();
        assert_eq!(updated.id(), 1);
    }

    #[tokio::test]
    async fn test_action_error_is_propagated() {
        let server = MockServer::start();
        let deposition = retrieved(&server).await;
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/deposit/depositions/1/actions/discard");
            then.status(400).json_body(json!({"status": 400, "message": "Not editing."}));
        });

        let err = deposition.discard().await.unwrap_err();

        assert_eq!(err.status_code(), Some(400));
    }

    #[tokio::test]
    async fn test_create_invalidates_and_relists() {
        // Arrange
        let server = MockServer::start();
        let mut deposition = retrieved(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.csv");
        std::fs::write(&path, "1,2").unwrap();

        let put_mock = server.mock(|when, then| {
            when.method(PUT).path("/api/files/bucket-1/b.csv").body("1,2");
            then.status(201).json_body(json!({"key": "b.csv"}));
        });
        let listing = json!([
            file_body(&server, 1, "a.csv", "md5:aaa"),
            file_body(&server, 1, "b.csv", "md5:bbb")
        ]);
        let list_mock = server.mock(|when, then| {
            when.method(GET).path("/api/deposit/depositions/1/files");
            then.status(200).json_body(listing);
        });

        // Act
        let files = deposition.files_mut();
        files
            .create(path.to_str().unwrap(), None, false)
            .await
            .unwrap();
        assert!(files.is_invalidated());
        let listed = files.files().await.unwrap().clone();

        // Assert
        put_mock.assert();
        list_mock.assert();
        assert_eq!(listed.len(), 2);
        assert!(!files.is_invalidated());
    }

    #[tokio::test]
    async fn test_create_stages_remote_file() {
        // Arrange
        let server = MockServer::start();
        let mut deposition = retrieved(&server).await;

        let source_mock = server.mock(|when, then| {
            when.method(GET).path("/remote/data.csv");
            then.status(200).body("x,y");
        });
        let put_mock = server.mock(|when, then| {
            when.method(PUT).path("/api/files/bucket-1/data.csv").body("x,y");
            then.status(201);
        });

        // Act
        deposition
            .files_mut()
            .create(&server.url("/remote/data.csv"), None, false)
            .await
            .unwrap();

        // Assert
        source_mock.assert();
        put_mock.assert();
        assert!(deposition.files().is_invalidated());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_locator() {
        let server = MockServer::start();
        let mut deposition = retrieved(&server).await;

        let result = deposition
            .files_mut()
            .create("not/a/file.csv", None, false)
            .await;

        assert!(matches!(result, Err(ZenodoError::InvalidFile(_))));
        assert!(deposition.files().is_invalidated());
    }

    #[tokio::test]
    async fn test_delete_file() {
        let server = MockServer::start();
        let mut deposition = retrieved(&server).await;
        let mock = server.mock(|when, then| {
            when.method(DELETE)
                .path("/api/deposit/depositions/1/files/file-a.csv");
            then.status(204);
        });
        let file = deposition.files().cached().get("a.csv").unwrap().clone();

        deposition.files_mut().delete(&file).await.unwrap();

        mock.assert();
        assert!(deposition.files().is_invalidated());
    }

    #[tokio::test]
    async fn test_download_draft_file_uses_token() {
        // Arrange
        let server = MockServer::start();
        let deposition = retrieved(&server).await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/records/1/draft/files/a.csv/content")
                .query_param("access_token", "token");
            then.status(200).body("a,b");
        });
        let dir = tempfile::tempdir().unwrap();
        let file = deposition.files().cached().get("a.csv").unwrap().clone();

        // Act
        let path = deposition
            .files()
            .download(&file, Some(dir.path()), false)
            .await
            .unwrap();

        // Assert
        mock.assert();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a,b");
    }

    #[tokio::test]
    async fn test_list_follows_pages_until_empty() {
        // Arrange
        let server = MockServer::start();
        let first = json!([record_body(&server, 1, false, "unsubmitted")]);
        let second = json!([record_body(&server, 2, true, "done")]);
        let page1 = server.mock(|when, then| {
            when.method(GET)
                .path("/api/deposit/depositions")
                .query_param("page", "1");
            then.status(200).json_body(first);
        });
        let page2 = server.mock(|when, then| {
            when.method(GET)
                .path("/api/deposit/depositions")
                .query_param("page", "2");
            then.status(200).json_body(second);
        });
        let page3 = server.mock(|when, then| {
            when.method(GET)
                .path("/api/deposit/depositions")
                .query_param("page", "3");
            then.status(200).json_body(json!([]));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        // Act
        let depositions = Depositions::new(client)
            .list(&DepositionQuery::default())
            .await
            .unwrap();

        // Assert
        page1.assert();
        page2.assert();
        page3.assert();
        let ids = depositions.iter().map(Deposition::id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2]);
    }
}
