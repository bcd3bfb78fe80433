//! A single file of a file set, stored locally or behind a URL.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;
use reqwest::header::{CONTENT_LENGTH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ZenodoError};
use crate::file::filestream::HTTP;
use crate::placeholder::{find_inline, stringify, substitute_inline};
use crate::utils::is_iso8601_datetime;

/// Schemes a locator must start with to be fetched over the network.
pub const REMOTE_SCHEMES: [&str; 2] = ["http://", "https://"];

/// Tag the server prefixes to MD5 checksums.
const MD5_TAG: &str = "md5:";

/// Format used for modification dates observed by this crate.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Strips the algorithm tag of a checksum, if any.
pub fn normalize_checksum(checksum: &str) -> &str {
    checksum.strip_prefix(MD5_TAG).unwrap_or(checksum)
}

/// A file identified by its `filename`, with optional metadata.
///
/// The checksum is only trusted as long as the size and modification date it
/// was computed with still hold: whenever a different size or date is
/// observed, the checksum is cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FileRecord", into = "FileRecord")]
pub struct FileEntity {
    filename: String,
    locator: String,
    checksum: Option<String>,
    size: Option<u64>,
    modified: Option<String>,
    properties: Map<String, Value>,
    id: Option<String>,
    self_link: Option<String>,
}

impl FileEntity {
    /// Creates a file from a local path or a URL.
    ///
    /// The filename is the last component of the locator.
    pub fn from_locator(locator: &str) -> Result<Self> {
        if locator.is_empty() {
            return Err(ZenodoError::InvalidArgument(
                "File locator can't be empty".to_string(),
            ));
        }

        let filename = if is_remote_locator(locator) {
            locator.rsplit('/').next().map(str::to_string)
        } else {
            Path::new(locator)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
        };

        match filename {
            Some(filename) if !filename.is_empty() => Ok(FileEntity {
                filename,
                locator: locator.to_string(),
                checksum: None,
                size: None,
                modified: None,
                properties: Map::new(),
                id: None,
                self_link: None,
            }),
            _ => Err(ZenodoError::InvalidArgument(format!(
                "Can't derive a filename from '{locator}'"
            ))),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Local path or URL to the file content.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn set_locator(&mut self, locator: impl Into<String>) {
        self.locator = locator.into();
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn set_checksum(&mut self, checksum: Option<String>) {
        self.checksum = checksum;
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = Some(size);
    }

    pub fn modified(&self) -> Option<&str> {
        self.modified.as_deref()
    }

    /// Sets the modification date, which must be an ISO-8601 date time.
    pub fn set_modified(&mut self, modified: &str) -> Result<()> {
        self.modified = Some(validate_timestamp(modified)?);
        Ok(())
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.properties
    }

    /// Identifier of the file within its deposition, for listed files.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// API link of the file resource, for listed files.
    pub fn self_link(&self) -> Option<&str> {
        self.self_link.as_deref()
    }

    /// True if the locator names an existing local file.
    pub fn is_local(&self) -> bool {
        Path::new(&self.locator).is_file()
    }

    /// True if the locator is an HTTP(S) URL.
    pub fn is_remote(&self) -> bool {
        is_remote_locator(&self.locator)
    }

    /// Inline placeholders left in the filename.
    pub fn placeholders(&self) -> BTreeSet<String> {
        find_inline(&self.filename)
    }

    /// Observes the current size and modification date of the file.
    ///
    /// Local files are inspected on disk, remote files with a `HEAD` request.
    /// Values the source does not report are left unchanged.
    pub async fn refresh_metadata(&mut self) -> Result<()> {
        if self.is_local() {
            let metadata = tokio::fs::metadata(&self.locator).await?;
            let modified = DateTime::<Local>::from(metadata.modified()?).naive_local();
            self.observe(Some(metadata.len()), Some(format_timestamp(&modified)));
        } else if self.is_remote() {
            let response = HTTP.head(&self.locator).send().await?.error_for_status()?;
            let headers = response.headers();

            let size = headers
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            let modified = headers
                .get(LAST_MODIFIED)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
                .map(|date| format_timestamp(&date.naive_utc()));

            self.observe(size, modified);
        } else {
            return Err(ZenodoError::InvalidFile(self.filename.clone()));
        }

        tracing::debug!(
            filename = %self.filename,
            size = ?self.size,
            modified = ?self.modified,
            "refreshed file metadata"
        );

        Ok(())
    }

    /// Records newly observed values, clearing a stale checksum.
    pub(crate) fn observe(&mut self, size: Option<u64>, modified: Option<String>) {
        if let Some(size) = size {
            if self.size.is_some_and(|known| known != size) {
                self.checksum = None;
            }
            self.size = Some(size);
        }

        if let Some(modified) = modified {
            if self.modified.as_ref().is_some_and(|known| *known != modified) {
                self.checksum = None;
            }
            self.modified = Some(modified);
        }
    }

    /// Copies every value `other` knows into this file.
    ///
    /// Properties are merged key by key. The resulting checksum is unset when
    /// the two files carry different checksums, or when only this file has
    /// one and `other` reports a different size or date.
    pub fn merge_from(&mut self, other: &FileEntity) -> Result<()> {
        if self.filename != other.filename {
            return Err(ZenodoError::FilenameMismatch {
                left: self.filename.clone(),
                right: other.filename.clone(),
            });
        }

        let valid_checksum = match (&self.checksum, &other.checksum) {
            (Some(own), Some(theirs)) => normalize_checksum(own) == normalize_checksum(theirs),
            (_, Some(_)) | (None, None) => true,
            (Some(_), None) => {
                compatible(&self.size, &other.size) && compatible(&self.modified, &other.modified)
            }
        };

        self.locator = other.locator.clone();
        if other.checksum.is_some() {
            self.checksum = other.checksum.clone();
        }
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.modified.is_some() {
            self.modified = other.modified.clone();
        }
        if other.id.is_some() {
            self.id = other.id.clone();
        }
        if other.self_link.is_some() {
            self.self_link = other.self_link.clone();
        }
        for (key, value) in &other.properties {
            self.properties.insert(key.clone(), value.clone());
        }

        if !valid_checksum {
            self.checksum = None;
        }

        Ok(())
    }

    /// True if both files are considered the same uploaded file.
    ///
    /// Filenames must be equal. A missing checksum on either side matches.
    pub fn matches(&self, other: &FileEntity) -> bool {
        if self.filename != other.filename {
            return false;
        }

        match (&self.checksum, &other.checksum) {
            (Some(own), Some(theirs)) => normalize_checksum(own) == normalize_checksum(theirs),
            _ => true,
        }
    }

    /// Extracts the template placeholders from the filename.
    pub fn parse_template(&self, template: &str) -> Result<Map<String, Value>> {
        parse_template(template, &self.filename)
    }

    /// Copy of this file with inline placeholders of filename and locator
    /// substituted, recording each substituted value as a property.
    pub(crate) fn expanded(&self, values: &HashMap<String, Value>) -> FileEntity {
        let mut file = self.clone();
        file.filename = substitute_inline(&self.filename, values);
        file.locator = substitute_inline(&self.locator, values);
        for (name, value) in values {
            file.properties
                .insert(name.clone(), Value::String(stringify(value)));
        }
        file
    }
}

impl TryFrom<Value> for FileEntity {
    type Error = ZenodoError;

    /// Builds a file from a locator string or from its JSON record.
    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(locator) => FileEntity::from_locator(&locator),
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| ZenodoError::InvalidArgument(format!("Invalid file record: {e}"))),
            other => Err(ZenodoError::InvalidArgument(format!(
                "Expecting a locator or a file record, got '{other}'"
            ))),
        }
    }
}

impl TryFrom<&str> for FileEntity {
    type Error = ZenodoError;

    fn try_from(locator: &str) -> Result<Self> {
        FileEntity::from_locator(locator)
    }
}

/// Extracts the values of the template placeholders from a filename.
///
/// Literal parts of the template must match exactly, in order. A filename
/// that does not match yields no properties.
///
/// ```
/// use zenodo::file::parse_template;
///
/// let properties = parse_template("file{index}.csv", "file7.csv").unwrap();
/// assert_eq!(properties["index"], "7");
/// ```
pub fn parse_template(template: &str, filename: &str) -> Result<Map<String, Value>> {
    let mut pattern = String::from("^");
    let mut last = 0;

    for placeholder in crate::placeholder::inline_matches(template) {
        pattern.push_str(&regex::escape(&template[last..placeholder.start]));
        pattern.push_str(&format!("(?P<{}>.*?)", placeholder.name));
        last = placeholder.end;
    }
    pattern.push_str(&regex::escape(&template[last..]));
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(|_| {
        ZenodoError::InvalidArgument(format!(
            "Can't parse template '{template}'. Check for duplicated placeholder names"
        ))
    })?;

    let mut properties = Map::new();
    if let Some(caps) = regex.captures(filename) {
        for name in regex.capture_names().flatten() {
            if let Some(value) = caps.name(name) {
                properties.insert(name.to_string(), Value::String(value.as_str().to_string()));
            }
        }
    }

    Ok(properties)
}

fn is_remote_locator(locator: &str) -> bool {
    REMOTE_SCHEMES
        .iter()
        .any(|scheme| locator.starts_with(scheme))
}

fn compatible<T: PartialEq>(own: &Option<T>, theirs: &Option<T>) -> bool {
    match (own, theirs) {
        (Some(own), Some(theirs)) => own == theirs,
        _ => true,
    }
}

fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

fn validate_timestamp(value: &str) -> Result<String> {
    if is_iso8601_datetime(value) {
        Ok(value.to_string())
    } else {
        Err(ZenodoError::InvalidArgument(format!(
            "Date '{value}' is not an ISO-8601 date time"
        )))
    }
}

/// Wire representation of a file, shared by manifests and the API.
#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filesize: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filedate: Option<String>,
    links: FileLinks,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileLinks {
    download: String,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    self_link: Option<String>,
}

impl TryFrom<FileRecord> for FileEntity {
    type Error = ZenodoError;

    fn try_from(record: FileRecord) -> Result<Self> {
        if record.filename.is_empty() {
            return Err(ZenodoError::InvalidArgument(
                "File record has an empty filename".to_string(),
            ));
        }

        Ok(FileEntity {
            filename: record.filename,
            locator: record.links.download,
            checksum: record.checksum,
            size: record.filesize,
            modified: record.filedate.as_deref().map(validate_timestamp).transpose()?,
            properties: record.properties,
            id: record.id.as_ref().map(stringify),
            self_link: record.links.self_link,
        })
    }
}

impl From<FileEntity> for FileRecord {
    fn from(file: FileEntity) -> Self {
        FileRecord {
            id: file.id.map(Value::String),
            filename: file.filename,
            filesize: file.size,
            checksum: file.checksum,
            filedate: file.modified,
            links: FileLinks {
                download: file.locator,
                self_link: file.self_link,
            },
            properties: file.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn file_with(checksum: Option<&str>, size: Option<u64>) -> FileEntity {
        let mut file = FileEntity::from_locator("data/file1.csv").unwrap();
        file.checksum = checksum.map(str::to_string);
        file.size = size;
        file
    }

    #[test]
    fn test_from_locator() {
        let local = FileEntity::from_locator("some/dir/file1.csv").unwrap();
        assert_eq!(local.filename(), "file1.csv");
        assert_eq!(local.locator(), "some/dir/file1.csv");
        assert!(local.properties().is_empty());

        let remote = FileEntity::from_locator("https://example.org/data/file2.csv").unwrap();
        assert_eq!(remote.filename(), "file2.csv");
        assert!(remote.is_remote());
        assert!(!remote.is_local());
    }

    #[test]
    fn test_from_invalid_values() {
        assert!(FileEntity::from_locator("").is_err());
        assert!(FileEntity::try_from(json!(42)).is_err());
        assert!(FileEntity::try_from(json!({"filename": "a.csv"})).is_err());
    }

    #[test]
    fn test_from_record() {
        let file = FileEntity::try_from(json!({
            "id": "e0b5a3d4",
            "filename": "a.csv",
            "filesize": 10,
            "checksum": "md5:abc",
            "links": {"download": "https://zenodo.org/a.csv", "self": "https://zenodo.org/api/f/1"}
        }))
        .unwrap();

        assert_eq!(file.id(), Some("e0b5a3d4"));
        assert_eq!(file.size(), Some(10));
        assert_eq!(file.self_link(), Some("https://zenodo.org/api/f/1"));
        assert_eq!(normalize_checksum(file.checksum().unwrap()), "abc");
    }

    #[test]
    fn test_record_rejects_invalid_date() {
        let result = FileEntity::try_from(json!({
            "filename": "a.csv",
            "filedate": "last tuesday",
            "links": {"download": "a.csv"}
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_observe_clears_stale_checksum() {
        let mut file = file_with(Some("abc"), Some(10));

        file.observe(Some(10), None);
        assert_eq!(file.checksum(), Some("abc"));

        file.observe(Some(11), None);
        assert_eq!(file.checksum(), None);
        assert_eq!(file.size(), Some(11));
    }

    #[test]
    fn test_observe_date_change_clears_checksum() {
        let mut file = file_with(Some("abc"), None);
        file.modified = Some("2023-01-01T00:00:00.000000".to_string());

        file.observe(None, Some("2023-01-02T00:00:00.000000".to_string()));

        assert_eq!(file.checksum(), None);
    }

    #[tokio::test]
    async fn test_refresh_local_metadata() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, "Hello").unwrap();
        let mut file = FileEntity::from_locator(path.to_str().unwrap()).unwrap();
        file.checksum = Some("abc".to_string());
        file.size = Some(3);

        // Act
        file.refresh_metadata().await.unwrap();

        // Assert
        assert_eq!(file.size(), Some(5));
        assert_eq!(file.checksum(), None);
        assert!(is_iso8601_datetime(file.modified().unwrap()));
    }

    #[tokio::test]
    async fn test_refresh_remote_metadata() {
        // Arrange
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::HEAD).path("/file.csv");
            then.status(200)
                .header("Content-Length", "42")
                .header("Last-Modified", "Wed, 17 May 2023 10:11:12 GMT");
        });
        let mut file = FileEntity::from_locator(&server.url("/file.csv")).unwrap();

        // Act
        file.refresh_metadata().await.unwrap();

        // Assert
        mock.assert();
        assert_eq!(file.size(), Some(42));
        assert_eq!(file.modified(), Some("2023-05-17T10:11:12.000000"));
    }

    #[tokio::test]
    async fn test_refresh_inaccessible_file() {
        let mut file = FileEntity::from_locator("does/not/exist.csv").unwrap();

        let result = file.refresh_metadata().await;

        assert!(matches!(result, Err(ZenodoError::InvalidFile(_))));
    }

    #[test]
    fn test_merge_requires_same_filename() {
        let mut a = FileEntity::from_locator("a.csv").unwrap();
        let b = FileEntity::from_locator("b.csv").unwrap();

        assert!(matches!(
            a.merge_from(&b),
            Err(ZenodoError::FilenameMismatch { .. })
        ));
    }

    #[test]
    fn test_merge_conflicting_checksums() {
        let mut a = file_with(Some("x"), None);
        let b = file_with(Some("y"), None);

        a.merge_from(&b).unwrap();

        assert_eq!(a.checksum(), None);
    }

    #[test]
    fn test_merge_keeps_checksum_when_consistent() {
        let mut a = file_with(Some("x"), Some(10));
        a.properties.insert("index".to_string(), json!("1"));
        let mut b = file_with(None, Some(10));
        b.properties.insert("year".to_string(), json!("2020"));

        a.merge_from(&b).unwrap();

        assert_eq!(a.checksum(), Some("x"));
        assert_eq!(a.properties().len(), 2);
    }

    #[test]
    fn test_merge_drops_checksum_on_size_change() {
        let mut a = file_with(Some("x"), Some(10));
        let b = file_with(None, Some(12));

        a.merge_from(&b).unwrap();

        assert_eq!(a.checksum(), None);
        assert_eq!(a.size(), Some(12));
    }

    #[test]
    fn test_merge_takes_incoming_checksum() {
        let mut a = file_with(None, Some(10));
        let b = file_with(Some("md5:y"), Some(12));

        a.merge_from(&b).unwrap();

        assert_eq!(a.checksum(), Some("md5:y"));
    }

    #[test]
    fn test_matches_truth_table() {
        let none = file_with(None, None);
        let x = file_with(Some("x"), None);
        let tagged_x = file_with(Some("md5:x"), None);
        let y = file_with(Some("y"), None);

        assert!(none.matches(&x));
        assert!(x.matches(&none));
        assert!(x.matches(&tagged_x));
        assert!(!x.matches(&y));
        assert!(!x.matches(&FileEntity::from_locator("other.csv").unwrap()));
    }

    #[test]
    fn test_parse_template() {
        let props = parse_template("data_{year}_{index}.csv", "data_2020_7.csv").unwrap();
        assert_eq!(props["year"], "2020");
        assert_eq!(props["index"], "7");

        let props = parse_template("data_{year}.csv", "data_2020xcsv").unwrap();
        assert!(props.is_empty());
    }

    #[test]
    fn test_parse_template_duplicated_names() {
        assert!(parse_template("{a}_{a}.csv", "1_2.csv").is_err());
    }

    #[test]
    fn test_expanded_records_properties() {
        let file = FileEntity::from_locator("https://example.org/{year}/file{index}.csv").unwrap();
        let values = HashMap::from([
            ("year".to_string(), json!(2020)),
            ("index".to_string(), json!("3")),
        ]);

        let expanded = file.expanded(&values);

        assert_eq!(expanded.filename(), "file3.csv");
        assert_eq!(expanded.locator(), "https://example.org/2020/file3.csv");
        assert_eq!(expanded.properties()["year"], "2020");
        assert!(expanded.placeholders().is_empty());
    }

    #[test]
    fn test_record_shape() {
        let mut file = FileEntity::from_locator("dir/a.csv").unwrap();
        file.set_size(3);

        let value = serde_json::to_value(&file).unwrap();

        assert_eq!(
            value,
            json!({
                "filename": "a.csv",
                "filesize": 3,
                "links": {"download": "dir/a.csv"},
                "properties": {}
            })
        );
    }
}
