//! A Rust library for interacting with the Zenodo REST API.
//!
//! The library keeps a set of local files, described by a manifest, in sync
//! with a Zenodo deposition. Files can be generated from filename templates,
//! deposition metadata can carry placeholders, and uploads only transfer new
//! or changed files.

#![warn(unused_crate_dependencies)]

/// Client functionality for interacting with the Zenodo API
pub mod client;

/// Errors of the library
pub mod error;

/// Placeholder search and substitution
pub mod placeholder;

/// Progress tracking utilities
pub(crate) mod progress;

/// Types for making requests to the Zenodo API
pub mod request;

/// Types for handling error responses of the Zenodo API
pub mod response;

/// General utility functions
pub mod utils;

/// File handling functionality
pub mod file {
    pub use entity::{normalize_checksum, parse_template, FileEntity};
    pub use fileset::FileSet;

    /// A single local or remote file
    pub mod entity;
    /// Collections of files keyed by filename
    pub mod fileset;
    /// Checksum computation
    pub mod hasher;
    /// File streaming utilities
    pub mod filestream;
}

/// Thin wrappers around the REST endpoints
pub mod native_api {
    /// Deposition endpoints
    pub mod deposition;
    /// Deposition file endpoints
    pub mod files;
    /// License endpoints
    pub mod licenses;
    /// Paginated search results
    pub mod page;
    /// Published record endpoints
    pub mod records;
}

/// Remote depositions and their files
pub mod deposition;

/// Typed deposition metadata
pub mod metadata;

/// Local files tracked by a manifest
pub mod localfiles;

/// Manifest files
pub mod manifest;

/// Upload of file sets with retries
pub mod upload;

/// Commonly used types and functions
pub mod prelude {
    pub use super::client::BaseClient;
    pub use super::deposition::{Deposition, DepositionFiles, Depositions};
    pub use super::error::{Result, ZenodoError};
    pub use super::file::{FileEntity, FileSet};
    pub use super::localfiles::{LinkOptions, LocalFiles};
    pub use super::metadata::{Field, Metadata};
    pub use super::upload::{RetryPolicy, UploadOptions, UploadReport};
    pub use super::utils::{date_seq, DateStep};
}

/// Command-line interface functionality
pub mod cli {
    /// Authentication commands
    pub mod auth;
    /// Base CLI functionality
    pub mod base;
    /// Deposition commands
    pub mod deposition;
    /// Local file commands
    pub mod files;
    /// License and record commands
    pub mod search;
    /// Upload command
    pub mod upload;
}

// Only used by the binary
use tracing_subscriber as _;
