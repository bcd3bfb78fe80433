//! Ordered collection of files keyed by filename, and its reconciliation.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Result, ZenodoError};
use crate::file::entity::FileEntity;

/// Files in insertion order, with unique filenames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSet {
    files: Vec<FileEntity>,
    index: HashMap<String, usize>,
}

impl FileSet {
    /// Builds a set, rejecting duplicated filenames.
    pub fn new(files: Vec<FileEntity>) -> Result<Self> {
        let mut set = FileSet::default();
        for file in files {
            set.push(file)?;
        }
        Ok(set)
    }

    /// Builds a set from locator strings and file records.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Result<Self> {
        let files = values
            .into_iter()
            .map(FileEntity::try_from)
            .collect::<Result<Vec<_>>>()?;
        Self::new(files)
    }

    /// Builds a set from local paths or URLs.
    pub fn from_locators<S: AsRef<str>>(locators: impl IntoIterator<Item = S>) -> Result<Self> {
        let files = locators
            .into_iter()
            .map(|locator| FileEntity::from_locator(locator.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(files)
    }

    /// Appends a file whose filename is not in the set yet.
    pub fn push(&mut self, file: FileEntity) -> Result<()> {
        if self.index.contains_key(file.filename()) {
            return Err(ZenodoError::DuplicateFilename(file.filename().to_string()));
        }
        self.index.insert(file.filename().to_string(), self.files.len());
        self.files.push(file);
        Ok(())
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

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, FileEntity> {
        self.files.iter_mut()
    }

    pub fn get(&self, filename: &str) -> Option<&FileEntity> {
        self.index.get(filename).map(|&i| &self.files[i])
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(FileEntity::filename)
    }

    /// True if a same-named file exists and both are the same uploaded file.
    ///
    /// See [`FileEntity::matches`] for the checksum rule.
    pub fn contains(&self, file: &FileEntity) -> bool {
        self.get(file.filename())
            .is_some_and(|own| own.matches(file))
    }

    /// Reconciles this set with `other`.
    ///
    /// Same-named files are merged with [`FileEntity::merge_from`], files
    /// unknown to this set are appended. With `remove_unmatched`, files whose
    /// filename is not in `other` are removed afterwards.
    pub fn merge(&mut self, other: &FileSet, remove_unmatched: bool) -> Result<&mut Self> {
        for file in other.iter() {
            match self.index.get(file.filename()) {
                Some(&i) => self.files[i].merge_from(file)?,
                None => self.push(file.clone())?,
            }
        }

        if remove_unmatched {
            self.retain(|file| other.index.contains_key(file.filename()));
        }

        Ok(self)
    }

    /// Returns the files for which `predicate` is true.
    ///
    /// The predicate receives a copy of each file, so it may modify it freely.
    pub fn filter<F>(&self, mut predicate: F) -> FileSet
    where
        F: FnMut(FileEntity) -> bool,
    {
        let files = self
            .files
            .iter()
            .filter(|file| predicate((*file).clone()))
            .cloned()
            .collect::<Vec<_>>();

        FileSet::from_unique(files)
    }

    /// Adds files from locators or records, without removing any file.
    ///
    /// With a `template`, the properties of each new file are parsed from
    /// its filename.
    pub fn add(
        &mut self,
        files: impl IntoIterator<Item = Value>,
        template: Option<&str>,
    ) -> Result<&mut Self> {
        let mut incoming = FileSet::from_values(files)?;

        if let Some(template) = template {
            for file in incoming.iter_mut() {
                let parsed = file.parse_template(template)?;
                file.properties_mut().extend(parsed);
            }
        }

        self.merge(&incoming, false)
    }

    /// Keeps only the files for which `keep` is true.
    pub(crate) fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&FileEntity) -> bool,
    {
        self.files.retain(keep);
        self.reindex();
    }

    /// Replaces the content of the set, keeping filenames unique.
    pub(crate) fn replace(&mut self, files: Vec<FileEntity>) -> Result<()> {
        *self = FileSet::new(files)?;
        Ok(())
    }

    /// Sum of the known file sizes.
    pub fn storage_size(&self) -> u64 {
        self.files.iter().filter_map(FileEntity::size).sum()
    }

    /// Names of every property found in the files.
    pub fn properties(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .flat_map(|file| file.properties().keys().cloned())
            .collect()
    }

    /// Smallest and largest value of each property.
    ///
    /// For every property `p`, the result holds `p_min` and `p_max`, computed
    /// over the non-empty values. Numbers compare numerically, anything else
    /// by its text. Properties without values are left out. All properties
    /// are summarized when `properties` is `None`.
    ///
    /// The result is meant to be used as placeholder replacements when
    /// rendering metadata.
    pub fn summary(&self, properties: Option<&[&str]>) -> Map<String, Value> {
        let names: Vec<String> = match properties {
            Some(names) => names.iter().map(|name| name.to_string()).collect(),
            None => self.properties().into_iter().collect(),
        };

        let mut summary = Map::new();
        for name in names {
            let values = self
                .files
                .iter()
                .filter_map(|file| file.properties().get(&name))
                .filter(|value| !is_empty_value(value))
                .collect::<Vec<_>>();

            let min = values.iter().copied().min_by(|a, b| compare_values(a, b));
            let max = values.iter().copied().max_by(|a, b| compare_values(a, b));

            if let (Some(min), Some(max)) = (min, max) {
                summary.insert(format!("{name}_min"), min.clone());
                summary.insert(format!("{name}_max"), max.clone());
            }
        }

        summary
    }

    fn from_unique(files: Vec<FileEntity>) -> FileSet {
        let mut set = FileSet {
            files,
            index: HashMap::new(),
        };
        set.reindex();
        set
    }

    fn reindex(&mut self) {
        self.index = self
            .files
            .iter()
            .enumerate()
            .map(|(i, file)| (file.filename().to_string(), i))
            .collect();
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a FileEntity;
    type IntoIter = std::slice::Iter<'a, FileEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

impl Serialize for FileSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.files.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FileSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let files = Vec::<FileEntity>::deserialize(deserializer)?;
        FileSet::new(files).map_err(serde::de::Error::custom)
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => crate::placeholder::stringify(a).cmp(&crate::placeholder::stringify(b)),
    }
}
