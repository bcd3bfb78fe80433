use std::path::Path;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;

use crate::error::{Result, ZenodoError};

/// Validates the output directory.
///
/// This function checks if the provided output directory is a directory and
/// creates it, including missing parents, when it does not exist yet.
///
/// # Arguments
///
/// * `out_dir` - A reference to a `Path` instance representing the output directory.
///
/// # Errors
///
/// This function will return an error if:
/// - The path exists but is not a directory.
/// - The directory cannot be created.
pub(crate) async fn validate_directory(out_dir: &Path) -> Result<()> {
    if out_dir.exists() && !out_dir.is_dir() {
        return Err(ZenodoError::InvalidDirectory(
            out_dir.display().to_string(),
        ));
    }

    if !out_dir.exists() {
        tokio::fs::create_dir_all(out_dir).await?;
    }

    Ok(())
}

/// Parses a JSON or YAML file into the specified type.
///
/// JSON is tried first, then YAML.
///
/// # Arguments
/// * `path` - Path to the file to parse
pub fn parse_file<P, T>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    if let Ok(content) = serde_json::from_str(&content) {
        Ok(content)
    } else if let Ok(content) = serde_yaml::from_str(&content) {
        Ok(content)
    } else {
        Err(ZenodoError::InvalidArgument(format!(
            "Failed to parse '{}' as either JSON or YAML",
            path.display()
        )))
    }
}

/// Checks if a string is a calendar date in the form `YYYY-MM-DD`.
pub fn is_iso8601_date(value: &str) -> bool {
    value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Checks if a string is an ISO-8601 date time.
///
/// Accepts `T` or a blank as separator, optional fractional seconds and an
/// optional UTC offset (`+HH:MM` or `+HHMM`).
pub fn is_iso8601_datetime(value: &str) -> bool {
    let value = value.replacen(' ', "T", 1);

    const NAIVE: &str = "%Y-%m-%dT%H:%M:%S%.f";
    const OFFSETS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

    NaiveDateTime::parse_from_str(&value, NAIVE).is_ok()
        || OFFSETS
            .iter()
            .any(|format| chrono::DateTime::parse_from_str(&value, format).is_ok())
}

/// Step between two consecutive dates of a [`date_seq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStep {
    Hours(u32),
    Days(u32),
    Months(u32),
    Years(u32),
}

impl DateStep {
    fn is_empty(&self) -> bool {
        matches!(
            self,
            DateStep::Hours(0) | DateStep::Days(0) | DateStep::Months(0) | DateStep::Years(0)
        )
    }

    /// Offsets `start` by `steps` times this step.
    ///
    /// Month arithmetic clamps to the last day of the target month, so that
    /// stepping monthly from January 31 yields February 28 (or 29).
    /// `None` once the offset no longer fits.
    fn advance(&self, start: NaiveDateTime, steps: u32) -> Option<NaiveDateTime> {
        match *self {
            DateStep::Hours(n) => {
                start.checked_add_signed(Duration::hours(i64::from(n.checked_mul(steps)?)))
            }
            DateStep::Days(n) => {
                start.checked_add_signed(Duration::days(i64::from(n.checked_mul(steps)?)))
            }
            DateStep::Months(n) => start.checked_add_months(Months::new(n.checked_mul(steps)?)),
            DateStep::Years(n) => {
                let months = n.checked_mul(12)?.checked_mul(steps)?;
                start.checked_add_months(Months::new(months))
            }
        }
    }
}

/// Generates the formatted dates between `start` and `end` (both inclusive).
///
/// Every date is computed from `start`, not from the previous element, so
/// monthly sequences do not drift after a short month. With `feb29` unset,
/// February 29 is written as February 28.
///
/// # Example
///
/// ```
/// use zenodo::utils::{date_seq, DateStep};
///
/// let dates = date_seq("20230101", "20230401", DateStep::Months(1), "%Y%m%d", true).unwrap();
/// assert_eq!(dates, vec!["20230101", "20230201", "20230301", "20230401"]);
/// ```
pub fn date_seq(
    start: &str,
    end: &str,
    step: DateStep,
    format: &str,
    feb29: bool,
) -> Result<Vec<String>> {
    if step.is_empty() {
        return Err(ZenodoError::InvalidArgument(
            "The date step must be positive".to_string(),
        ));
    }

    let start = parse_date(start, format)?;
    let end = parse_date(end, format)?;

    let mut sequence = Vec::new();
    let mut current = start;
    let mut steps: u32 = 1;

    while current <= end {
        if !feb29 && current.month() == 2 && current.day() == 29 {
            current = current.with_day(28).unwrap_or(current);
        }
        sequence.push(current.format(format).to_string());

        current = match step.advance(start, steps) {
            Some(next) => next,
            None => break,
        };
        steps = match steps.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(sequence)
}

/// Parses a date with a format that may or may not carry a time of day.
fn parse_date(value: &str, format: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format)
        .or_else(|_| {
            NaiveDate::parse_from_str(value, format).map(|date| date.and_hms_opt(0, 0, 0))
                .map(|date| date.unwrap_or_default())
        })
        .map_err(|_| {
            ZenodoError::InvalidArgument(format!(
                "Date '{value}' does not match the format '{format}'"
            ))
        })
}
