use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use structopt::StructOpt;

use crate::client::{evaluate_empty_response, evaluate_response, BaseClient};
use crate::error::{Result, ZenodoError};
use crate::file::FileEntity;
use crate::placeholder::stringify;
use crate::request::RequestType;

const DEPOSITIONS: &str = "api/deposit/depositions";

/// State of a deposition as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositionState {
    /// Draft never published.
    Unsubmitted,
    /// Published deposition opened for edition.
    InProgress,
    /// Published deposition.
    Done,
    #[serde(other)]
    Unknown,
}

/// Snapshot of a deposition, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositionRecord {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DepositionState>,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conceptrecid: Option<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub links: Map<String, Value>,
    #[serde(default)]
    pub files: Vec<FileEntity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DepositionRecord {
    /// Link of the given relation, e.g. `bucket` or `html`.
    pub fn link(&self, name: &str) -> Option<&str> {
        self.links.get(name).and_then(Value::as_str)
    }

    /// The DOI, falling back to the one reserved before publication.
    pub fn doi(&self) -> Option<String> {
        match self.doi.as_deref() {
            Some(doi) if !doi.is_empty() => Some(doi.to_string()),
            _ => self
                .metadata
                .get("prereserve_doi")
                .and_then(|reserved| reserved.get("doi"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// Identifier shared by every version of the deposition.
    pub fn concept_id(&self) -> Option<String> {
        self.conceptrecid
            .as_ref()
            .map(stringify)
            .filter(|id| !id.is_empty())
    }
}

/// Status filter of a deposition search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositionStatus {
    Draft,
    Published,
}

impl Display for DepositionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DepositionStatus::Draft => write!(f, "draft"),
            DepositionStatus::Published => write!(f, "published"),
        }
    }
}

impl FromStr for DepositionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DepositionStatus::Draft),
            "published" => Ok(DepositionStatus::Published),
            _ => Err(format!(
                "Invalid status '{s}'. Supported options are 'draft' and 'published'"
            )),
        }
    }
}

/// Sort order of a deposition search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositionSort {
    BestMatch,
    BestMatchDesc,
    MostRecent,
    MostRecentDesc,
}

impl Display for DepositionSort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            DepositionSort::BestMatch => "bestmatch",
            DepositionSort::BestMatchDesc => "-bestmatch",
            DepositionSort::MostRecent => "mostrecent",
            DepositionSort::MostRecentDesc => "-mostrecent",
        };
        write!(f, "{value}")
    }
}

impl FromStr for DepositionSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bestmatch" => Ok(DepositionSort::BestMatch),
            "-bestmatch" => Ok(DepositionSort::BestMatchDesc),
            "mostrecent" => Ok(DepositionSort::MostRecent),
            "-mostrecent" => Ok(DepositionSort::MostRecentDesc),
            _ => Err(format!(
                "Invalid sort '{s}'. Supported options are bestmatch, -bestmatch, mostrecent and -mostrecent"
            )),
        }
    }
}

/// Search parameters of the deposition listing.
#[derive(StructOpt, Debug, Clone, Default, PartialEq)]
pub struct DepositionQuery {
    #[structopt(short, long, help = "Search query (Elasticsearch syntax)")]
    pub q: Option<String>,

    #[structopt(short, long, help = "Filter by status (draft, published)")]
    pub status: Option<DepositionStatus>,

    #[structopt(long, help = "Sort order (bestmatch, mostrecent, prefix '-' to reverse)")]
    pub sort: Option<DepositionSort>,

    #[structopt(long, help = "Number of results per page")]
    pub size: Option<u32>,

    #[structopt(long, help = "Page number, starting at 1")]
    pub page: Option<u32>,

    #[structopt(long, help = "Show every version of each deposition")]
    pub all_versions: bool,
}

impl DepositionQuery {
    pub(crate) fn to_parameters(&self) -> HashMap<String, String> {
        let mut parameters = HashMap::new();

        if let Some(q) = &self.q {
            parameters.insert("q".to_string(), q.clone());
        }
        if let Some(status) = self.status {
            parameters.insert("status".to_string(), status.to_string());
        }
        if let Some(sort) = self.sort {
            parameters.insert("sort".to_string(), sort.to_string());
        }
        if let Some(size) = self.size {
            parameters.insert("size".to_string(), size.to_string());
        }
        if let Some(page) = self.page {
            parameters.insert("page".to_string(), page.to_string());
        }
        if self.all_versions {
            parameters.insert("all_versions".to_string(), "true".to_string());
        }

        parameters
    }
}

/// Lists one page of the depositions of the authenticated user.
pub async fn list_depositions(
    client: &BaseClient,
    query: &DepositionQuery,
) -> Result<Vec<DepositionRecord>> {
    let response = client
        .get(DEPOSITIONS, Some(query.to_parameters()), RequestType::Plain)
        .await;
    evaluate_response(response).await
}

/// Creates a new draft deposition.
///
/// The metadata is wrapped into a `metadata` entry unless it already has one.
pub async fn create_deposition(
    client: &BaseClient,
    metadata: Option<Value>,
) -> Result<DepositionRecord> {
    let body = match metadata {
        Some(Value::Object(map)) if !map.is_empty() => wrap_metadata(Value::Object(map)),
        Some(Value::Object(_)) | None => Value::Object(Map::new()),
        Some(other) => {
            return Err(ZenodoError::InvalidArgument(format!(
                "Deposition metadata must be an object, got '{other}'"
            )))
        }
    };

    let response = client
        .post(DEPOSITIONS, None, RequestType::json(&body)?)
        .await;
    evaluate_response(response).await
}

pub async fn retrieve_deposition(client: &BaseClient, id: i64) -> Result<DepositionRecord> {
    let response = client
        .get(&format!("{DEPOSITIONS}/{id}"), None, RequestType::Plain)
        .await;
    evaluate_response(response).await
}

/// Replaces the metadata of a draft deposition.
pub async fn update_deposition(
    client: &BaseClient,
    id: i64,
    metadata: Value,
) -> Result<DepositionRecord> {
    if !metadata.is_object() {
        return Err(ZenodoError::InvalidArgument(format!(
            "Deposition metadata must be an object, got '{metadata}'"
        )));
    }

    let body = wrap_metadata(metadata);
    let response = client
        .put(
            &format!("{DEPOSITIONS}/{id}"),
            None,
            RequestType::json(&body)?,
        )
        .await;
    evaluate_response(response).await
}

/// Deletes an unpublished deposition.
pub async fn delete_deposition(client: &BaseClient, id: i64) -> Result<()> {
    let response = client
        .delete(&format!("{DEPOSITIONS}/{id}"), None, RequestType::Plain)
        .await;
    evaluate_empty_response(response).await
}

pub async fn publish_deposition(client: &BaseClient, id: i64) -> Result<DepositionRecord> {
    action(client, id, "publish").await
}

/// Unlocks a published deposition for edition.
pub async fn edit_deposition(client: &BaseClient, id: i64) -> Result<DepositionRecord> {
    action(client, id, "edit").await
}

/// Discards the changes made since the last `edit`.
pub async fn discard_deposition(client: &BaseClient, id: i64) -> Result<DepositionRecord> {
    action(client, id, "discard").await
}

/// Creates a new version of a published deposition.
///
/// The server answers with the published deposition, so the new draft is
/// fetched through its `latest_draft` link.
pub async fn new_version_deposition(client: &BaseClient, id: i64) -> Result<DepositionRecord> {
    let record = action(client, id, "newversion").await?;
    let latest_draft = record.link("latest_draft").ok_or_else(|| {
        ZenodoError::MalformedResponse {
            url: format!("{DEPOSITIONS}/{id}/actions/newversion"),
            reason: "missing 'links.latest_draft'".to_string(),
        }
    })?;

    let response = client.get(latest_draft, None, RequestType::Plain).await;
    evaluate_response(response).await
}

/// Returns the bucket URL of a deposition, fetching the deposition when the
/// snapshot does not carry it.
pub async fn get_deposition_bucket(
    client: &BaseClient,
    record: &DepositionRecord,
) -> Result<String> {
    if let Some(bucket) = record.link("bucket") {
        return Ok(bucket.to_string());
    }

    let record = retrieve_deposition(client, record.id).await?;
    record
        .link("bucket")
        .map(str::to_string)
        .ok_or_else(|| ZenodoError::MalformedResponse {
            url: format!("{DEPOSITIONS}/{}", record.id),
            reason: "missing 'links.bucket'".to_string(),
        })
}

async fn action(client: &BaseClient, id: i64, name: &str) -> Result<DepositionRecord> {
    let response = client
        .post(
            &format!("{DEPOSITIONS}/{id}/actions/{name}"),
            None,
            RequestType::Plain,
        )
        .await;
    evaluate_response(response).await
}

fn wrap_metadata(metadata: Value) -> Value {
    match metadata {
        Value::Object(map) if map.contains_key("metadata") => Value::Object(map),
        other => serde_json::json!({ "metadata": other }),
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn record_body(id: i64) -> Value {
        json!({
            "id": id,
            "state": "unsubmitted",
            "submitted": false,
            "title": "My title",
            "conceptrecid": "100",
            "metadata": {"title": "My title", "prereserve_doi": {"doi": "10.5281/zenodo.1", "recid": 1}},
            "links": {"bucket": "https://zenodo.org/api/files/abc"},
            "files": [],
            "owner": 7
        })
    }

    #[test]
    fn test_record_accessors() {
        let record: DepositionRecord = serde_json::from_value(record_body(1)).unwrap();

        assert_eq!(record.state, Some(DepositionState::Unsubmitted));
        assert_eq!(record.doi(), Some("10.5281/zenodo.1".to_string()));
        assert_eq!(record.concept_id(), Some("100".to_string()));
        assert_eq!(record.link("bucket"), Some("https://zenodo.org/api/files/abc"));
        assert_eq!(record.extra["owner"], 7);
    }

    #[test]
    fn test_query_parameters() {
        let query = DepositionQuery {
            status: Some("published".parse().unwrap()),
            sort: Some("-mostrecent".parse().unwrap()),
            page: Some(2),
            ..Default::default()
        };

        let parameters = query.to_parameters();

        assert_eq!(parameters["status"], "published");
        assert_eq!(parameters["sort"], "-mostrecent");
        assert_eq!(parameters["page"], "2");
        assert!(!parameters.contains_key("q"));
        assert!("latest".parse::<DepositionSort>().is_err());
    }

    #[tokio::test]
    async fn test_create_wraps_metadata() {
        // Arrange
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/deposit/depositions")
                .json_body(json!({"metadata": {"title": "My title"}}));
            then.status(201).json_body(record_body(1));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        // Act
        let record = create_deposition(&client, Some(json!({"title": "My title"})))
            .await
            .unwrap();

        // Assert
        mock.assert();
        assert_eq!(record.id, 1);
    }

    #[tokio::test]
    async fn test_update_keeps_wrapped_metadata() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/api/deposit/depositions/5")
                .json_body(json!({"metadata": {"title": "New"}}));
            then.status(200).json_body(record_body(5));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        let record = update_deposition(&client, 5, json!({"metadata": {"title": "New"}}))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(record.id, 5);
    }

    #[tokio::test]
    async fn test_new_version_follows_latest_draft() {
        // Arrange
        let server = MockServer::start();
        let mut published = record_body(5);
        published["links"]["latest_draft"] = json!(server.url("/api/deposit/depositions/6"));

        let action_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/deposit/depositions/5/actions/newversion");
            then.status(201).json_body(published.clone());
        });
        let draft_mock = server.mock(|when, then| {
            when.method(GET).path("/api/deposit/depositions/6");
            then.status(200).json_body(record_body(6));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        // Act
        let record = new_version_deposition(&client, 5).await.unwrap();

        // Assert
        action_mock.assert();
        draft_mock.assert();
        assert_eq!(record.id, 6);
    }

    #[tokio::test]
    async fn test_bucket_is_fetched_when_unknown() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/deposit/depositions/1");
            then.status(200).json_body(record_body(1));
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();
        let mut record: DepositionRecord = serde_json::from_value(record_body(1)).unwrap();
        record.links.clear();

        let bucket = get_deposition_bucket(&client, &record).await.unwrap();

        mock.assert();
        assert_eq!(bucket, "https://zenodo.org/api/files/abc");
    }

    #[tokio::test]
    async fn test_delete_accepts_empty_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE).path("/api/deposit/depositions/3");
            then.status(204);
        });
        let client = BaseClient::new(&server.base_url(), None).unwrap();

        delete_deposition(&client, 3).await.unwrap();

        mock.assert();
    }
}
