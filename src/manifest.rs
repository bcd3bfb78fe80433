//! On-disk record of a set of local files and of the deposition they are
//! synchronized with.
//!
//! ```json
//! {
//!   "localfiles": [{"filename": "a.csv", "links": {"download": "data/a.csv"}, ...}],
//!   "zenodo": {"id": 1234, ...}
//! }
//! ```
//!
//! `zenodo` is `null` until a deposition is linked. A bare identifier is
//! accepted in place of the snapshot.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ZenodoError};
use crate::file::filestream::create_dirs_from_path;
use crate::file::FileSet;
use crate::native_api::deposition::DepositionRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub localfiles: FileSet,
    #[serde(default)]
    pub zenodo: Option<LinkedDeposition>,
}

/// Deposition a manifest is linked with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkedDeposition {
    Id(i64),
    Snapshot(Box<DepositionRecord>),
}

impl LinkedDeposition {
    pub fn id(&self) -> i64 {
        match self {
            LinkedDeposition::Id(id) => *id,
            LinkedDeposition::Snapshot(record) => record.id,
        }
    }
}

impl Manifest {
    /// Reads a manifest from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ZenodoError::InvalidManifest(format!(
                "file '{}' does not exist",
                path.display()
            )));
        }

        let content = tokio::fs::read_to_string(path).await?;
        let value: Value = serde_json::from_str(&content)?;
        Manifest::from_value(value)
    }

    /// Validates the layout of a manifest before deserializing it.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = &value else {
            return Err(ZenodoError::InvalidManifest(
                "expected a JSON object".to_string(),
            ));
        };

        if !map.contains_key("localfiles") {
            return Err(ZenodoError::InvalidManifest(
                "no 'localfiles' entry found".to_string(),
            ));
        }

        match map.get("zenodo") {
            None | Some(Value::Null) | Some(Value::Number(_)) => {}
            Some(Value::Object(zenodo)) if zenodo.contains_key("id") => {}
            Some(_) => {
                return Err(ZenodoError::InvalidManifest(
                    "the linked deposition must have a 'zenodo.id' value".to_string(),
                ))
            }
        }

        serde_json::from_value(value)
            .map_err(|err| ZenodoError::InvalidManifest(err.to_string()))
    }

    /// Writes the manifest as pretty printed JSON.
    pub async fn save(&self, path: &Path) -> Result<()> {
        create_dirs_from_path(path).await?;
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;

        tracing::debug!(path = %path.display(), files = self.localfiles.len(), "saved manifest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_manifest_round_trip() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let data = dir.path().join("a.csv");
        std::fs::write(&data, "1,2").unwrap();

        let mut files = FileSet::from_locators([data.to_str().unwrap()]).unwrap();
        for file in files.iter_mut() {
            file.refresh_metadata().await.unwrap();
            file.set_checksum(Some("abc".to_string()));
            file.properties_mut().insert("index".to_string(), json!("1"));
        }
        let manifest = Manifest {
            localfiles: files,
            zenodo: Some(LinkedDeposition::Id(42)),
        };

        // Act
        manifest.save(&path).await.unwrap();
        let loaded = Manifest::load(&path).await.unwrap();

        // Assert
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.zenodo.map(|linked| linked.id()), Some(42));
    }

    #[test]
    fn test_snapshot_is_accepted() {
        let value = json!({
            "localfiles": [],
            "zenodo": {"id": 7, "submitted": false, "metadata": {"title": "x"}, "links": {}}
        });

        let manifest = Manifest::from_value(value).unwrap();

        assert!(matches!(manifest.zenodo, Some(LinkedDeposition::Snapshot(_))));
        assert_eq!(manifest.zenodo.unwrap().id(), 7);
    }

    #[test]
    fn test_null_deposition() {
        let manifest = Manifest::from_value(json!({"localfiles": [], "zenodo": null})).unwrap();

        assert!(manifest.zenodo.is_none());
        assert!(manifest.localfiles.is_empty());
    }

    #[test]
    fn test_missing_localfiles() {
        let result = Manifest::from_value(json!({"zenodo": null}));

        assert!(matches!(result, Err(ZenodoError::InvalidManifest(_))));
    }

    #[test]
    fn test_snapshot_without_id() {
        let result = Manifest::from_value(json!({"localfiles": [], "zenodo": {"title": "x"}}));

        assert!(matches!(result, Err(ZenodoError::InvalidManifest(_))));
    }

    #[test]
    fn test_duplicated_files() {
        let value = json!({
            "localfiles": [
                {"filename": "a.csv", "links": {"download": "data/a.csv"}},
                {"filename": "a.csv", "links": {"download": "other/a.csv"}}
            ],
            "zenodo": null
        });

        let result = Manifest::from_value(value);

        assert!(matches!(result, Err(ZenodoError::InvalidManifest(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = Manifest::load(Path::new("does/not/exist.json")).await;

        assert!(matches!(result, Err(ZenodoError::InvalidManifest(_))));
    }
}
