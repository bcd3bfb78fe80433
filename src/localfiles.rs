//! Local files tracked by a manifest and synchronized with a deposition.
//!
//! A [`LocalFiles`] is usually built in one of three ways:
//! - from a list of paths or URLs with [`LocalFiles::new`],
//! - from a filename template expanded over value grids with
//!   [`LocalFiles::from_template`] and [`LocalFiles::expand`],
//! - from a manifest saved earlier with [`LocalFiles::from_file`].
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use zenodo::localfiles::LocalFiles;
//!
//! let mut files = LocalFiles::from_template("data/file{index}_{year}.csv").unwrap();
//! files.expand("index", vec![json!(10), json!(20), json!(30)]).unwrap();
//! files.expand("year", vec![json!("2019"), json!("2020")]).unwrap();
//!
//! assert_eq!(files.len(), 6);
//! assert!(files.placeholders().is_empty());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::client::BaseClient;
use crate::deposition::{Deposition, Depositions};
use crate::error::{Result, ZenodoError};
use crate::file::{FileEntity, FileSet};
use crate::manifest::{LinkedDeposition, Manifest};
use crate::placeholder::find_inline;
use crate::upload::{upload_files, RemoteFiles, UploadOptions, UploadReport};

/// How [`LocalFiles::set_deposition`] finds the deposition to link.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Deposition to link. The one recorded in the manifest when `None`.
    pub deposition: Option<i64>,
    /// Metadata of the deposition created when nothing is linked yet.
    pub metadata: Option<Value>,
    /// Create a deposition when neither the manifest nor `deposition` name one.
    pub create_if_not_exists: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            deposition: None,
            metadata: None,
            create_if_not_exists: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalFiles {
    files: FileSet,
    placeholders: BTreeSet<String>,
    manifest: Option<PathBuf>,
    deposition: Option<Deposition>,
}

impl LocalFiles {
    /// Builds the set from paths, URLs or file records.
    ///
    /// With a `template`, the properties of each file are parsed from its
    /// filename.
    pub fn new(files: impl IntoIterator<Item = Value>, template: Option<&str>) -> Result<Self> {
        let template = match template.map(str::trim) {
            Some("") => {
                return Err(ZenodoError::InvalidArgument(
                    "Template is empty".to_string(),
                ))
            }
            other => other,
        };

        let mut files = FileSet::from_values(files)?;
        if let Some(template) = template {
            for file in files.iter_mut() {
                let parsed = file.parse_template(template)?;
                file.properties_mut().extend(parsed);
            }
        }

        Ok(LocalFiles {
            files,
            ..Default::default()
        })
    }

    /// A single templated file, to be expanded with [`LocalFiles::expand`].
    pub fn from_template(template: &str) -> Result<Self> {
        let template = template.trim();
        let files = FileSet::from_locators([template])?;

        Ok(LocalFiles {
            files,
            placeholders: find_inline(template),
            ..Default::default()
        })
    }

    /// Loads the files recorded in a manifest.
    ///
    /// The linked deposition is not contacted, see
    /// [`LocalFiles::set_deposition`].
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest = Manifest::load(path).await?;

        Ok(LocalFiles {
            files: manifest.localfiles,
            manifest: Some(path.to_path_buf()),
            ..Default::default()
        })
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntity> {
        self.files.iter()
    }

    pub fn get(&self, filename: &str) -> Option<&FileEntity> {
        self.files.get(filename)
    }

    /// Template placeholders still waiting for values.
    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    /// Path of the manifest the files were loaded from or saved to.
    pub fn manifest_path(&self) -> Option<&Path> {
        self.manifest.as_deref()
    }

    /// The linked deposition, once [`LocalFiles::set_deposition`] was called.
    pub fn deposition(&self) -> Option<&Deposition> {
        self.deposition.as_ref()
    }

    pub fn properties(&self) -> BTreeSet<String> {
        self.files.properties()
    }

    pub fn storage_size(&self) -> u64 {
        self.files.storage_size()
    }

    /// See [`FileSet::summary`].
    pub fn summary(&self, properties: Option<&[&str]>) -> Map<String, Value> {
        self.files.summary(properties)
    }

    /// Expands one placeholder over a list of values.
    ///
    /// Every file is replaced by one copy per value. Calling it for several
    /// placeholders one after the other yields their combinations.
    pub fn expand(&mut self, name: &str, values: Vec<Value>) -> Result<&mut Self> {
        self.expand_zip(vec![(name, values)])
    }

    /// Expands several placeholders together.
    ///
    /// The i-th value of every list is substituted in the same copy, so all
    /// lists must have the same length. Empty lists leave the files as they
    /// are.
    ///
    /// # Errors
    ///
    /// [`ZenodoError::InvalidArgument`] if a name is not a pending
    /// placeholder or if the lists have different lengths.
    pub fn expand_zip(&mut self, values: Vec<(&str, Vec<Value>)>) -> Result<&mut Self> {
        if self.placeholders.is_empty() {
            return Err(ZenodoError::InvalidArgument(
                "There is no placeholder to be expanded".to_string(),
            ));
        }

        for (name, _) in &values {
            if !self.placeholders.contains(*name) {
                return Err(ZenodoError::InvalidArgument(format!(
                    "Placeholder '{name}' not found"
                )));
            }
        }

        let lengths = values
            .iter()
            .map(|(_, values)| values.len())
            .collect::<BTreeSet<_>>();
        if lengths.len() > 1 {
            return Err(ZenodoError::InvalidArgument(
                "All value lists must have the same length".to_string(),
            ));
        }

        let count = lengths.into_iter().next().unwrap_or(0);
        if count == 0 {
            return Ok(self);
        }

        let grid = (0..count)
            .map(|i| {
                values
                    .iter()
                    .map(|(name, values)| (name.to_string(), values[i].clone()))
                    .collect::<HashMap<_, _>>()
            })
            .collect::<Vec<_>>();

        let expanded = self
            .files
            .iter()
            .flat_map(|file| grid.iter().map(move |row| file.expanded(row)))
            .collect::<Vec<_>>();
        self.files.replace(expanded)?;

        for (name, _) in &values {
            self.placeholders.remove(*name);
        }

        Ok(self)
    }

    /// Reconciles the files with `other`, see [`FileSet::merge`].
    pub fn merge(&mut self, other: &FileSet, remove_unmatched: bool) -> Result<&mut Self> {
        self.ensure_expanded("merge")?;
        self.files.merge(other, remove_unmatched)?;
        Ok(self)
    }

    /// Adds or updates files, see [`FileSet::add`].
    pub fn add(
        &mut self,
        files: impl IntoIterator<Item = Value>,
        template: Option<&str>,
    ) -> Result<&mut Self> {
        self.ensure_expanded("add")?;
        self.files.add(files, template)?;
        Ok(self)
    }

    /// New, unsaved set with the files for which `predicate` is true.
    pub fn filter<F>(&self, predicate: F) -> Result<LocalFiles>
    where
        F: FnMut(FileEntity) -> bool,
    {
        self.ensure_expanded("filter")?;

        Ok(LocalFiles {
            files: self.files.filter(predicate),
            ..Default::default()
        })
    }

    /// Rewrites every locator as `prefix + modifier(locator) + suffix`.
    pub fn modify_url<F>(
        &mut self,
        prefix: Option<&str>,
        mut modifier: F,
        suffix: Option<&str>,
    ) -> Result<&mut Self>
    where
        F: FnMut(&str) -> String,
    {
        self.ensure_expanded("modify")?;

        for file in self.files.iter_mut() {
            let locator = format!(
                "{}{}{}",
                prefix.unwrap_or_default(),
                modifier(file.locator()),
                suffix.unwrap_or_default()
            );
            file.set_locator(locator);
        }

        Ok(self)
    }

    /// Saves the files into a manifest.
    ///
    /// When the manifest exists, its files are reconciled with the current
    /// ones (files missing from the current set are dropped) and its linked
    /// deposition is kept. Sizes and dates are refreshed before writing.
    ///
    /// # Arguments
    ///
    /// * `path` - The manifest to write. The current one when `None`.
    pub async fn save(&mut self, path: Option<&Path>) -> Result<&mut Self> {
        self.ensure_expanded("save")?;

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| self.manifest.clone())
            .ok_or_else(|| {
                ZenodoError::InvalidArgument("No manifest path to save the files".to_string())
            })?;

        let zenodo = if path.is_file() {
            let mut stored = Manifest::load(&path).await?;
            stored.localfiles.merge(&self.files, true)?;
            self.files.merge(&stored.localfiles, true)?;
            stored.zenodo
        } else {
            None
        };

        for file in self.files.iter_mut() {
            file.refresh_metadata().await?;
        }

        let manifest = Manifest {
            localfiles: self.files.clone(),
            zenodo,
        };
        manifest.save(&path).await?;
        self.manifest = Some(path);

        Ok(self)
    }

    /// Links the files to a deposition and records it in the manifest.
    ///
    /// The files must have been saved first. Without an explicit deposition,
    /// the one recorded in the manifest is retrieved, or a new one is created
    /// when allowed.
    ///
    /// # Errors
    ///
    /// - [`ZenodoError::NoDeposition`] if nothing is linked and creation is
    ///   not allowed.
    /// - [`ZenodoError::DepositionMismatch`] if the manifest is already
    ///   linked to another deposition.
    pub async fn set_deposition(
        &mut self,
        client: &BaseClient,
        options: LinkOptions,
    ) -> Result<&Deposition> {
        let path = self.manifest.clone().ok_or_else(|| {
            ZenodoError::InvalidArgument(
                "Save the files before linking them with a deposition".to_string(),
            )
        })?;

        let mut manifest = Manifest::load(&path).await?;
        let linked = manifest.zenodo.as_ref().map(LinkedDeposition::id);
        let depositions = Depositions::new(client.clone());

        let deposition = match (options.deposition, linked) {
            (None, None) => {
                if !options.create_if_not_exists {
                    return Err(ZenodoError::NoDeposition);
                }
                manifest.save(&path).await?;
                depositions.create(options.metadata).await?
            }
            (None, Some(linked)) => depositions.retrieve(linked).await?,
            (Some(provided), linked) => {
                if let Some(linked) = linked.filter(|linked| *linked != provided) {
                    return Err(ZenodoError::DepositionMismatch { linked, provided });
                }
                depositions.retrieve(provided).await?
            }
        };

        manifest.zenodo = Some(LinkedDeposition::Snapshot(Box::new(
            deposition.record().clone(),
        )));
        manifest.save(&path).await?;
        tracing::info!(id = deposition.id(), manifest = %path.display(), "linked deposition");

        Ok(self.deposition.insert(deposition))
    }

    /// Uploads new and changed files to the linked deposition.
    pub async fn upload(&mut self, options: &mut UploadOptions) -> Result<UploadReport> {
        let mut deposition = self.deposition.take().ok_or(ZenodoError::NoDeposition)?;
        let outcome = self.upload_to(deposition.files_mut(), options).await;
        self.deposition = Some(deposition);
        outcome
    }

    /// Uploads new and changed files to `remote`.
    ///
    /// The manifest, if any, is saved whether the batch succeeds or not, so
    /// computed checksums are kept. The remote files are listed again after a
    /// successful batch.
    pub async fn upload_to<R: RemoteFiles>(
        &mut self,
        remote: &mut R,
        options: &mut UploadOptions,
    ) -> Result<UploadReport> {
        self.ensure_expanded("upload")?;

        let outcome = upload_files(&mut self.files, remote, options).await;
        let saved = match self.manifest {
            Some(_) => self.save(None).await.map(|_| ()),
            None => Ok(()),
        };

        let report = outcome?;
        saved?;
        remote.reload().await?;

        tracing::info!(
            uploaded = report.uploaded,
            skipped = report.skipped,
            "upload finished"
        );
        Ok(report)
    }

    fn ensure_expanded(&self, operation: &'static str) -> Result<()> {
        if self.placeholders.is_empty() {
            Ok(())
        } else {
            Err(ZenodoError::PendingPlaceholders {
                operation,
                pending: self.placeholders.clone(),
            })
        }
    }
}
