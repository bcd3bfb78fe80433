use std::path::Path;

use reqwest::Url;
use serde_json::{json, Value};

use crate::client::{evaluate_empty_response, evaluate_response, BaseClient};
use crate::error::{Result, ZenodoError};
use crate::file::{normalize_checksum, FileEntity};
use crate::request::RequestType;

/// Lists the files of a deposition.
pub async fn list_deposition_files(client: &BaseClient, id: i64) -> Result<Vec<FileEntity>> {
    let response = client
        .get(
            &format!("api/deposit/depositions/{id}/files"),
            None,
            RequestType::Plain,
        )
        .await;
    evaluate_response(response).await
}

/// Streams a local file into the bucket of a deposition.
///
/// # Arguments
///
/// * `client` - The client used to send the request.
/// * `bucket` - Bucket URL of the deposition.
/// * `path` - Local file to upload.
/// * `bucket_filename` - Name of the file in the bucket, the base name of
///   `path` when `None`.
/// * `progress` - Whether to display a progress bar.
///
/// # Returns
///
/// The object description sent back by the bucket.
pub async fn create_deposition_file(
    client: &BaseClient,
    bucket: &str,
    path: &Path,
    bucket_filename: Option<&str>,
    progress: bool,
) -> Result<Value> {
    if !path.is_file() {
        return Err(ZenodoError::InvalidFile(path.display().to_string()));
    }

    let name = match bucket_filename {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| ZenodoError::InvalidFile(path.display().to_string()))?,
    };

    let url = bucket_file_url(bucket, &name)?;
    let context = RequestType::File {
        path: path.to_path_buf(),
        name: name.clone(),
        progress,
    };

    let response = client.put(url.as_str(), None, context).await;
    evaluate_response(response).await
}

/// URL of `name` inside a bucket, with the name percent-encoded as a
/// single path segment.
fn bucket_file_url(bucket: &str, name: &str) -> Result<Url> {
    let invalid = || ZenodoError::InvalidArgument(format!("Invalid bucket URL '{bucket}'"));

    let mut url = Url::parse(bucket).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .push(name);
    Ok(url)
}

/// Sets the order of the files of a deposition.
///
/// # Arguments
///
/// * `ids` - Identifiers of every file of the deposition, in the new order.
pub async fn sort_deposition_files(
    client: &BaseClient,
    id: i64,
    ids: &[String],
) -> Result<Vec<FileEntity>> {
    let body = ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>();
    let response = client
        .put(
            &format!("api/deposit/depositions/{id}/files"),
            None,
            RequestType::json(&body)?,
        )
        .await;
    evaluate_response(response).await
}

/// Retrieves a file through its `self` link.
pub async fn retrieve_deposition_file(client: &BaseClient, self_link: &str) -> Result<FileEntity> {
    let response = client.get(self_link, None, RequestType::Plain).await;
    evaluate_response(response).await
}

/// Deletes a file through its `self` link.
pub async fn delete_deposition_file(client: &BaseClient, self_link: &str) -> Result<()> {
    let response = client.delete(self_link, None, RequestType::Plain).await;
    evaluate_empty_response(response).await
}

/// MD5 checksum of a deposition file, without algorithm tag.
///
/// The file is retrieved when the listing did not include its checksum.
pub async fn checksum_deposition_file(client: &BaseClient, file: &FileEntity) -> Result<String> {
    if let Some(checksum) = file.checksum() {
        return Ok(normalize_checksum(checksum).to_string());
    }

    let self_link = file.self_link().ok_or_else(|| {
        ZenodoError::InvalidArgument(format!("File '{}' has no 'self' link", file.filename()))
    })?;

    let retrieved = retrieve_deposition_file(client, self_link).await?;
    retrieved
        .checksum()
        .map(|checksum| normalize_checksum(checksum).to_string())
        .ok_or_else(|| ZenodoError::MalformedResponse {
            url: self_link.to_string(),
            reason: "missing 'checksum'".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn file_body(server: &MockServer, id: &str, checksum: &str) -> Value {
        json!({
            "id": id,
            "filename": format!("{id}.csv"),
            "filesize": 5,
            "checksum": checksum,
            "links": {
                "self": server.url(format!("/api/deposit/depositions/1/files/{id}")),
                "download": server.url(format!("/api/records/1/draft/files/{id}.csv/content"))
            }
        })
    }

    #[tokio::test]
    async fn test_create_deposition_file() {
        // Arrange
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/api/files/bucket-id/renamed.txt")
                .header("Content-Type", "application/octet-stream")
                .body("Hello, world!");
            then.status(201)
                .json_body(json!({"key": "renamed.txt", "checksum": "md5:6cd3556deb0da54bca060b4c39479839"}));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, "Hello, world!").unwrap();

        // Act
        let body = create_deposition_file(
            &client,
            &server.url("/api/files/bucket-id"),
            &path,
            Some("renamed.txt"),
            false,
        )
        .await
        .unwrap();

        // Assert
        mock.assert();
        assert_eq!(body["key"], "renamed.txt");
    }

    #[test]
    fn test_bucket_file_url_encodes_name() {
        let url = bucket_file_url("https://zenodo.org/api/files/bucket-id/", "a #1?.csv").unwrap();

        assert_eq!(
            url.as_str(),
            "https://zenodo.org/api/files/bucket-id/a%20%231%3F.csv"
        );
        assert!(bucket_file_url("not a url", "a.csv").is_err());
    }

    #[tokio::test]
    async fn test_create_missing_file() {
        let client = BaseClient::new("https://zenodo.org", None).unwrap();

        let result = create_deposition_file(
            &client,
            "https://zenodo.org/api/files/bucket",
            Path::new("does/not/exist.txt"),
            None,
            false,
        )
        .await;

        assert!(matches!(result, Err(ZenodoError::InvalidFile(_))));
    }

    #[tokio::test]
    async fn test_list_and_sort_files() {
        // Arrange
        let server = MockServer::start();
        let listed = json!([file_body(&server, "a", "md5:1"), file_body(&server, "b", "md5:2")]);
        let sorted = json!([file_body(&server, "b", "md5:2"), file_body(&server, "a", "md5:1")]);

        let list_mock = server.mock(|when, then| {
            when.method(GET).path("/api/deposit/depositions/1/files");
            then.status(200).json_body(listed);
        });
        let sort_mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/api/deposit/depositions/1/files")
                .json_body(json!([{"id": "b"}, {"id": "a"}]));
            then.status(200).json_body(sorted);
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        // Act
        let files = list_deposition_files(&client, 1).await.unwrap();
        let ids = files
            .iter()
            .rev()
            .filter_map(|file| file.id().map(str::to_string))
            .collect::<Vec<_>>();
        let files = sort_deposition_files(&client, 1, &ids).await.unwrap();

        // Assert
        list_mock.assert();
        sort_mock.assert();
        assert_eq!(files[0].filename(), "b.csv");
    }

    #[tokio::test]
    async fn test_checksum_is_retrieved_when_unknown() {
        // Arrange
        let server = MockServer::start();
        let body = file_body(&server, "a", "md5:abc");
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/deposit/depositions/1/files/a");
            then.status(200).json_body(body.clone());
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        let mut file = FileEntity::try_from(file_body(&server, "a", "md5:abc")).unwrap();
        file.set_checksum(None);

        // Act
        let checksum = checksum_deposition_file(&client, &file).await.unwrap();

        // Assert
        mock.assert();
        assert_eq!(checksum, "abc");
    }
}
