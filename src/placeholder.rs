//! Placeholder search and substitution over JSON values.
//!
//! Two kinds of placeholders are recognized at any depth of a value:
//!
//! * inline placeholders, `{name}` inside a string. Substitution always
//!   yields a string, non-string replacements are written as JSON text.
//! * reference placeholders, an object whose `$ref` entry is a string made of
//!   the reference scheme followed by the name, e.g. `{"$ref": "zen:name"}`.
//!   Substitution replaces the **whole object** by the replacement value, so
//!   any other entry of that object is dropped.
//!
//! Names start with a letter or underscore, followed by letters, digits or
//! underscores.

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{Result, ZenodoError};

/// Scheme prefix of reference placeholders.
pub const DEFAULT_SCHEMA: &str = "zen:";

/// Key marking a reference placeholder object.
pub const REF_KEY: &str = "$ref";

lazy_static! {
    static ref INLINE: Regex =
        Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("Invalid inline placeholder pattern");
    static ref NAME: Regex =
        Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("Invalid placeholder name pattern");
}

/// Builds a reference placeholder for `name` with the default scheme.
///
/// ```
/// use zenodo::placeholder::reference;
///
/// assert_eq!(reference("title"), serde_json::json!({"$ref": "zen:title"}));
/// ```
pub fn reference(name: &str) -> Value {
    serde_json::json!({ REF_KEY: format!("{DEFAULT_SCHEMA}{name}") })
}

/// Collects the distinct names of all placeholders in `obj`.
///
/// `schema` is the prefix of reference placeholders, `None` disables them so
/// that `$ref` objects are searched like any other object.
///
/// # Errors
///
/// [`ZenodoError::InvalidPlaceholder`] if a reference carries the scheme but
/// not a valid name.
pub fn find_placeholders(obj: &Value, schema: Option<&str>) -> Result<BTreeSet<String>> {
    let mut found = BTreeSet::new();
    collect(obj, schema, &mut found)?;
    Ok(found)
}

/// Names of the inline placeholders of a single string.
pub fn find_inline(text: &str) -> BTreeSet<String> {
    INLINE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Position of an inline placeholder within a string.
pub(crate) struct InlineMatch<'a> {
    pub start: usize,
    pub end: usize,
    pub name: &'a str,
}

pub(crate) fn inline_matches(text: &str) -> impl Iterator<Item = InlineMatch<'_>> {
    INLINE.captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some(InlineMatch {
            start: whole.start(),
            end: whole.end(),
            name: caps.get(1)?.as_str(),
        })
    })
}

/// Replaces every placeholder of `obj` by its value in `replacements`.
///
/// # Errors
///
/// * [`ZenodoError::MissingPlaceholders`] naming every placeholder of `obj`
///   without replacement. Nothing is replaced in this case.
/// * [`ZenodoError::InvalidPlaceholder`] for malformed references.
pub fn substitute(
    obj: &Value,
    replacements: &HashMap<String, Value>,
    schema: Option<&str>,
) -> Result<Value> {
    let missing: BTreeSet<String> = find_placeholders(obj, schema)?
        .into_iter()
        .filter(|name| !replacements.contains_key(name))
        .collect();

    if !missing.is_empty() {
        return Err(ZenodoError::MissingPlaceholders(missing));
    }

    replace(obj, replacements, schema)
}

/// Replaces the inline placeholders of a string, leaving unknown ones as is.
pub fn substitute_inline(text: &str, replacements: &HashMap<String, Value>) -> String {
    INLINE
        .replace_all(text, |caps: &Captures| match replacements.get(&caps[1]) {
            Some(value) => stringify(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Text inserted in place of an inline placeholder.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn collect(obj: &Value, schema: Option<&str>, found: &mut BTreeSet<String>) -> Result<()> {
    match obj {
        Value::String(text) => found.extend(find_inline(text)),
        Value::Array(items) => {
            for item in items {
                collect(item, schema, found)?;
            }
        }
        Value::Object(map) => match reference_name(map, schema)? {
            Some(name) => {
                found.insert(name.to_string());
            }
            None => {
                for value in map.values() {
                    collect(value, schema, found)?;
                }
            }
        },
        _ => {}
    }
    Ok(())
}

fn replace(
    obj: &Value,
    replacements: &HashMap<String, Value>,
    schema: Option<&str>,
) -> Result<Value> {
    Ok(match obj {
        Value::String(text) => Value::String(substitute_inline(text, replacements)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| replace(item, replacements, schema))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => match reference_name(map, schema)? {
            Some(name) => match replacements.get(name) {
                Some(value) => value.clone(),
                None => obj.clone(),
            },
            None => Value::Object(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), replace(value, replacements, schema)?)))
                    .collect::<Result<_>>()?,
            ),
        },
        other => other.clone(),
    })
}

/// Name of the reference placeholder held by `map`, if it is one.
fn reference_name<'a>(
    map: &'a serde_json::Map<String, Value>,
    schema: Option<&str>,
) -> Result<Option<&'a str>> {
    let schema = match schema {
        Some(schema) if !schema.is_empty() => schema,
        _ => return Ok(None),
    };

    match map.get(REF_KEY) {
        Some(Value::String(target)) if target.starts_with(schema) => {
            let name = &target[schema.len()..];
            if NAME.is_match(name) {
                Ok(Some(name))
            } else {
                Err(ZenodoError::InvalidPlaceholder(target.clone()))
            }
        }
        _ => Ok(None),
    }
}
