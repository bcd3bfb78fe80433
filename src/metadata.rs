//! Typed deposition metadata.
//!
//! Every field, including those of nested entries such as creators, may
//! hold a reference placeholder (`{"$ref": "zen:<name>"}`) instead of its
//! value. String values may contain inline `{name}` placeholders, and fields
//! of other types accept a string made of inline placeholders, e.g.
//! `"access_right": "{access}"`. Placeholders are resolved by
//! [`Metadata::render`], which produces the plain JSON sent to the server.
//!
//! Fields without a typed counterpart (journal, conference, imprint and
//! thesis details, ...) are kept in [`Metadata::extra`].
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use serde_json::json;
//! use zenodo::metadata::{Creator, Field, Metadata};
//!
//! let mut metadata = Metadata::dataset();
//! metadata.title = Some(Field::placeholder("the_title"));
//! metadata.description = Some("Index from {index_min} to {index_max}".into());
//! metadata.add_creator(Creator::new("Doe, John")).unwrap();
//!
//! let replacements = HashMap::from([
//!     ("the_title".to_string(), json!("My dataset")),
//!     ("index_min".to_string(), json!("1")),
//!     ("index_max".to_string(), json!("3")),
//! ]);
//! let rendered = metadata.render(&replacements).unwrap();
//!
//! assert_eq!(rendered["title"], "My dataset");
//! assert_eq!(rendered["description"], "Index from 1 to 3");
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ZenodoError};
use crate::placeholder::{find_inline, find_placeholders, substitute, DEFAULT_SCHEMA};
use crate::utils::{is_iso8601_date, parse_file};

/// A metadata value or a placeholder standing for it.
///
/// Variants are tried in order, so a string field keeps its inline
/// placeholders as a plain value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field<T> {
    Placeholder(Reference),
    Value(T),
    Template(Template),
}

/// Body of a reference placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    #[serde(rename = "$ref")]
    pub target: String,
}

/// A string with at least one inline placeholder, standing for a value
/// that is not a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template(String);

impl Template {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Template {
    type Error = ZenodoError;

    fn try_from(text: String) -> Result<Self> {
        if find_inline(&text).is_empty() {
            return Err(ZenodoError::InvalidArgument(format!(
                "'{text}' holds no placeholder"
            )));
        }
        Ok(Template(text))
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.0
    }
}

impl<T> Field<T> {
    /// A reference placeholder named `name`.
    pub fn placeholder(name: &str) -> Self {
        Field::Placeholder(Reference {
            target: format!("{DEFAULT_SCHEMA}{name}"),
        })
    }

    /// A string of inline placeholders, e.g. `"{access}"`.
    ///
    /// # Errors
    ///
    /// Fails if `text` holds no inline placeholder.
    pub fn template(text: &str) -> Result<Self> {
        Template::try_from(text.to_string()).map(Field::Template)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(value) => Some(value),
            Field::Placeholder(_) | Field::Template(_) => None,
        }
    }

    /// True while the field waits for a replacement.
    pub fn is_placeholder(&self) -> bool {
        !matches!(self, Field::Value(_))
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl From<&str> for Field<String> {
    fn from(value: &str) -> Self {
        Field::Value(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    Publication,
    Poster,
    Presentation,
    Dataset,
    Image,
    Video,
    Software,
    Lesson,
    PhysicalObject,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationType {
    AnnotationCollection,
    Book,
    Section,
    ConferencePaper,
    DataManagementPlan,
    Article,
    Patent,
    Preprint,
    Deliverable,
    Milestone,
    Proposal,
    Report,
    SoftwareDocumentation,
    TaxonomicTreatment,
    TechnicalNote,
    Thesis,
    WorkingPaper,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Figure,
    Plot,
    Drawing,
    Diagram,
    Photo,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRight {
    Open,
    Embargoed,
    Restricted,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributorType {
    ContactPerson,
    DataCollector,
    DataCurator,
    DataManager,
    Distributor,
    Editor,
    HostingInstitution,
    Producer,
    ProjectLeader,
    ProjectManager,
    ProjectMember,
    RegistrationAgency,
    RegistrationAuthority,
    RelatedPerson,
    Researcher,
    ResearchGroup,
    RightsHolder,
    Supervisor,
    Sponsor,
    WorkPackageLeader,
    Other,
}

/// Relation of a related identifier to the deposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Relation {
    IsCitedBy,
    Cites,
    IsSupplementTo,
    IsSupplementedBy,
    IsContinuedBy,
    Continues,
    IsDescribedBy,
    Describes,
    HasMetadata,
    IsMetadataFor,
    IsNewVersionOf,
    IsPreviousVersionOf,
    IsPartOf,
    HasPart,
    IsReferencedBy,
    References,
    IsDocumentedBy,
    Documents,
    IsCompiledBy,
    Compiles,
    IsVariantFormOf,
    #[serde(rename = "isOriginalFormof")]
    IsOriginalFormOf,
    IsIdenticalTo,
    IsAlternateIdentifier,
    IsReviewedBy,
    Reviews,
    IsDerivedFrom,
    IsSourceOf,
    Requires,
    IsRequiredBy,
    IsObsoletedBy,
    Obsoletes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateType {
    Collected,
    Valid,
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnd: Option<Field<String>>,
}

impl Creator {
    pub fn new(name: &str) -> Self {
        Creator {
            name: name.into(),
            affiliation: None,
            orcid: None,
            gnd: None,
        }
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<Field<String>>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    pub fn with_orcid(mut self, orcid: impl Into<Field<String>>) -> Self {
        self.orcid = Some(orcid.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: Field<String>,
    #[serde(rename = "type")]
    pub kind: Field<ContributorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnd: Option<Field<String>>,
}

impl Contributor {
    pub fn new(name: &str, kind: ContributorType) -> Self {
        Contributor {
            name: name.into(),
            kind: kind.into(),
            affiliation: None,
            orcid: None,
            gnd: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedIdentifier {
    pub identifier: Field<String>,
    pub relation: Field<Relation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<Field<String>>,
}

impl RelatedIdentifier {
    pub fn new(identifier: &str, relation: Relation) -> Self {
        RelatedIdentifier {
            identifier: identifier.into(),
            relation: relation.into(),
            resource_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub identifier: Field<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: Field<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub term: Field<String>,
    pub identifier: Field<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Field<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub place: Field<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<Field<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<Field<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Field<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    #[serde(rename = "type")]
    pub kind: Field<DateType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Field<String>>,
}

impl DateInterval {
    /// Builds an interval, checking that both bounds are `YYYY-MM-DD` dates.
    pub fn new(
        kind: DateType,
        start: Option<&str>,
        end: Option<&str>,
        description: Option<&str>,
    ) -> Result<Self> {
        for date in [start, end].into_iter().flatten() {
            check_date("date interval", date)?;
        }

        Ok(DateInterval {
            kind: kind.into(),
            start: start.map(Field::from),
            end: end.map(Field::from),
            description: description.map(Field::from),
        })
    }

    fn validate(&self) -> Result<()> {
        for date in [&self.start, &self.end].into_iter().flatten() {
            if let Field::Value(date) = date {
                check_date("date interval", date)?;
            }
        }
        Ok(())
    }
}

/// Metadata of a deposition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_type: Option<Field<UploadType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<Field<PublicationType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<Field<ImageType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creators: Option<Field<Vec<Creator>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_right: Option<Field<AccessRight>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embargo_date: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_conditions: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prereserve_doi: Option<Field<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Field<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_identifiers: Option<Field<Vec<RelatedIdentifier>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributors: Option<Field<Vec<Contributor>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Field<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communities: Option<Field<Vec<Community>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<Field<Vec<Grant>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Field<Vec<Subject>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Field<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Field<Vec<Location>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<Field<Vec<DateInterval>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Field<String>>,
    /// Any other field, sent as is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    /// Empty metadata of the given type, asking the server to reserve a DOI.
    pub fn new(upload_type: UploadType) -> Self {
        Metadata {
            upload_type: Some(upload_type.into()),
            prereserve_doi: Some(Field::Value(Value::Bool(true))),
            ..Default::default()
        }
    }

    pub fn dataset() -> Self {
        Self::new(UploadType::Dataset)
    }

    pub fn publication(publication_type: PublicationType) -> Self {
        Metadata {
            publication_type: Some(publication_type.into()),
            ..Self::new(UploadType::Publication)
        }
    }

    pub fn poster() -> Self {
        Self::new(UploadType::Poster)
    }

    pub fn presentation() -> Self {
        Self::new(UploadType::Presentation)
    }

    pub fn image(image_type: ImageType) -> Self {
        Metadata {
            image_type: Some(image_type.into()),
            ..Self::new(UploadType::Image)
        }
    }

    pub fn video() -> Self {
        Self::new(UploadType::Video)
    }

    pub fn software() -> Self {
        Self::new(UploadType::Software)
    }

    pub fn lesson() -> Self {
        Self::new(UploadType::Lesson)
    }

    pub fn physical_object() -> Self {
        Self::new(UploadType::PhysicalObject)
    }

    pub fn other() -> Self {
        Self::new(UploadType::Other)
    }

    /// Builds metadata from JSON, unwrapping a `metadata` entry if present.
    ///
    /// # Errors
    ///
    /// Fails if a field has an unexpected shape or if `publication_date`,
    /// `embargo_date` or a date interval bound is not a `YYYY-MM-DD` date.
    pub fn from_value(value: Value) -> Result<Self> {
        let value = match value {
            Value::Object(mut map) if map.get("metadata").is_some_and(Value::is_object) => {
                map.remove("metadata").unwrap_or_default()
            }
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(ZenodoError::InvalidArgument(format!(
                    "Metadata must be an object, got '{other}'"
                )))
            }
        };

        let metadata: Metadata = serde_json::from_value(value)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Reads metadata from a JSON or YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let value: Value = parse_file(path)?;
        Self::from_value(value)
    }

    /// License applied when the deposition is opened without one.
    pub fn default_license(&self) -> &'static str {
        match self.upload_type.as_ref().and_then(Field::value) {
            Some(UploadType::Dataset) => "cc-zero",
            _ => "cc-by",
        }
    }

    /// Access right of the deposition, open when unset.
    pub fn access(&self) -> Option<AccessRight> {
        match &self.access_right {
            None => Some(AccessRight::Open),
            Some(field) => field.value().copied(),
        }
    }

    /// Opens the deposition under `license`, or the default license.
    pub fn set_open(&mut self, license: Option<&str>) {
        let license = license.unwrap_or(self.default_license());
        self.access_right = Some(AccessRight::Open.into());
        self.license = Some(license.into());
    }

    /// Keeps the files closed until `embargo_date`, then opens them under
    /// `license`.
    pub fn set_embargoed(&mut self, license: &str, embargo_date: Option<&str>) -> Result<()> {
        if let Some(date) = embargo_date {
            check_date("embargo_date", date)?;
            self.embargo_date = Some(date.into());
        }
        self.access_right = Some(AccessRight::Embargoed.into());
        self.license = Some(license.into());
        Ok(())
    }

    /// Gives access to the files upon request, under `access_conditions`.
    pub fn set_restricted(&mut self, access_conditions: &str) {
        self.access_right = Some(AccessRight::Restricted.into());
        self.access_conditions = Some(access_conditions.into());
    }

    pub fn set_closed(&mut self) {
        self.access_right = Some(AccessRight::Closed.into());
    }

    pub fn set_publication_date(&mut self, date: &str) -> Result<()> {
        check_date("publication_date", date)?;
        self.publication_date = Some(date.into());
        Ok(())
    }

    pub fn add_creator(&mut self, creator: Creator) -> Result<()> {
        push_entry(&mut self.creators, "creators", creator)
    }

    pub fn add_contributor(&mut self, contributor: Contributor) -> Result<()> {
        push_entry(&mut self.contributors, "contributors", contributor)
    }

    pub fn add_keyword(&mut self, keyword: &str) -> Result<()> {
        push_entry(&mut self.keywords, "keywords", keyword.to_string())
    }

    pub fn add_reference(&mut self, reference: &str) -> Result<()> {
        push_entry(&mut self.references, "references", reference.to_string())
    }

    pub fn add_related_identifier(&mut self, related: RelatedIdentifier) -> Result<()> {
        push_entry(&mut self.related_identifiers, "related_identifiers", related)
    }

    pub fn add_community(&mut self, identifier: &str) -> Result<()> {
        let community = Community {
            identifier: identifier.into(),
        };
        push_entry(&mut self.communities, "communities", community)
    }

    pub fn add_grant(&mut self, id: &str) -> Result<()> {
        push_entry(&mut self.grants, "grants", Grant { id: id.into() })
    }

    pub fn add_subject(&mut self, subject: Subject) -> Result<()> {
        push_entry(&mut self.subjects, "subjects", subject)
    }

    pub fn add_location(&mut self, location: Location) -> Result<()> {
        push_entry(&mut self.locations, "locations", location)
    }

    pub fn add_date(&mut self, date: DateInterval) -> Result<()> {
        push_entry(&mut self.dates, "dates", date)
    }

    /// Names of every placeholder, reference or inline.
    pub fn placeholders(&self) -> Result<BTreeSet<String>> {
        find_placeholders(&serde_json::to_value(self)?, Some(DEFAULT_SCHEMA))
    }

    /// The metadata as plain JSON with every placeholder replaced.
    ///
    /// # Errors
    ///
    /// [`ZenodoError::MissingPlaceholders`] if a placeholder has no
    /// replacement.
    pub fn render(&self, replacements: &HashMap<String, Value>) -> Result<Value> {
        let value = serde_json::to_value(self)?;
        substitute(&value, replacements, Some(DEFAULT_SCHEMA))
    }

    fn validate(&self) -> Result<()> {
        let dates = [
            ("publication_date", &self.publication_date),
            ("embargo_date", &self.embargo_date),
        ];
        for (name, field) in dates {
            if let Some(Field::Value(date)) = field {
                check_date(name, date)?;
            }
        }

        if let Some(Field::Value(intervals)) = &self.dates {
            for interval in intervals {
                interval.validate()?;
            }
        }

        Ok(())
    }
}

fn push_entry<T>(field: &mut Option<Field<Vec<T>>>, name: &str, entry: T) -> Result<()> {
    match field {
        None => {
            *field = Some(Field::Value(vec![entry]));
            Ok(())
        }
        Some(Field::Value(entries)) => {
            entries.push(entry);
            Ok(())
        }
        Some(Field::Placeholder(_) | Field::Template(_)) => Err(ZenodoError::InvalidArgument(
            format!("Field '{name}' holds a placeholder"),
        )),
    }
}

fn check_date(name: &str, value: &str) -> Result<()> {
    if is_iso8601_date(value) {
        Ok(())
    } else {
        Err(ZenodoError::InvalidArgument(format!(
            "Invalid '{name}' value '{value}'. Format must be 'YYYY-MM-DD'"
        )))
    }
}
