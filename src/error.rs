//! Error type shared by every part of the library.
//!
//! Errors fall into three groups:
//! - validation errors, raised before anything is sent to the server,
//! - remote errors, produced by the HTTP layer,
//! - exhausted upload retries.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::response::ApiError;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ZenodoError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ZenodoError {
    /// An argument has the wrong shape or value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Two files in the same set share a filename.
    #[error("Duplicated filename '{0}' in the file list")]
    DuplicateFilename(String),

    /// Tried to merge two files with different filenames.
    #[error("Invalid file merge: '{left}' and '{right}' do not share the same filename")]
    FilenameMismatch { left: String, right: String },

    /// A reference placeholder carries the right scheme but an illegal name.
    #[error("Invalid placeholder name '{0}'")]
    InvalidPlaceholder(String),

    /// Rendering found placeholders without a replacement value.
    #[error("Missing replacements for placeholders: {}", join(.0))]
    MissingPlaceholders(BTreeSet<String>),

    /// The operation needs every template placeholder to be expanded first.
    #[error("Cannot {operation} files with non-evaluated placeholders ({}). Use `expand()` first", join(.pending))]
    PendingPlaceholders {
        operation: &'static str,
        pending: BTreeSet<String>,
    },

    /// The file is neither present on disk nor a supported URL.
    #[error("Invalid file '{0}': not a local file nor a remote URL")]
    InvalidFile(String),

    /// The path is not usable as a directory.
    #[error("Invalid directory '{0}'")]
    InvalidDirectory(String),

    /// The manifest file is missing or has an unexpected layout.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// No deposition is linked to the local files.
    #[error("No deposition is linked with the current files. Provide one or allow its creation")]
    NoDeposition,

    /// The manifest is already linked to another deposition.
    #[error("The linked deposition ({linked}) differs from the provided one ({provided})")]
    DepositionMismatch { linked: i64, provided: i64 },

    /// The server answered with an error status.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The request could not be sent or the body could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a body that is not the expected JSON.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// A file could not be created remotely after all retries.
    #[error("Upload of '{filename}' failed after {attempts} attempts: {source}")]
    UploadFailed {
        filename: String,
        attempts: usize,
        #[source]
        source: Box<ZenodoError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ZenodoError {
    /// True for responses the server sent without a usable JSON body.
    ///
    /// Several deposition actions answer with an empty body on some
    /// deployments; callers use this to decide when to fall back to
    /// invalidating their cached state instead of failing.
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, ZenodoError::MalformedResponse { .. })
    }

    /// Status code of the server error, if this is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ZenodoError::Api(err) => Some(err.status_code),
            _ => None,
        }
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_placeholders_message_lists_names() {
        let names = BTreeSet::from(["b".to_string(), "a".to_string()]);
        let err = ZenodoError::MissingPlaceholders(names);

        assert_eq!(
            err.to_string(),
            "Missing replacements for placeholders: a, b"
        );
    }

    #[test]
    fn test_malformed_response_detection() {
        let err = ZenodoError::MalformedResponse {
            url: "https://zenodo.org".to_string(),
            reason: "EOF while parsing a value".to_string(),
        };

        assert!(err.is_malformed_response());
        assert!(!ZenodoError::NoDeposition.is_malformed_response());
        assert_eq!(err.status_code(), None);
    }
}
