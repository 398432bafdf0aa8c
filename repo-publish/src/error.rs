// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {crate::validation::ValidationIssue, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum RepoPublishError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("storage I/O error on path {0}: {1:?}")]
    StoragePath(String, std::io::Error),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage access denied: {0}")]
    AccessDenied(String),

    #[error("storage object not found: {0}")]
    NotFound(String),

    #[error("malformed package {0}: {1}")]
    MalformedPackage(String, String),

    #[error("packages resolve to more than one repository: {0}")]
    MixedTargets(String),

    #[error("none of the named packages exist in the repository")]
    NothingToRemove,

    #[error("repository failed validation with {} issue(s)", .0.len())]
    IntegrityViolation(Vec<ValidationIssue>),

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailure {
        tool: String,
        status: i32,
        stderr: String,
    },

    #[error("external tool not runnable: {0}: {1:?}")]
    ToolNotRunnable(String, std::io::Error),

    #[error("XML error: {0:?}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0:?}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("malformed metadata document: {0}")]
    MetadataParse(String),

    #[error("repository metadata entry not found: {0}")]
    MetadataFileNotFound(&'static str),

    #[error("SQLite error: {0:?}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0:?}")]
    Json(#[from] serde_json::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RepoPublishError>;
