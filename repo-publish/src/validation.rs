// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Validation issue reporting shared by both repository families. */

/// Classifies a validation finding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IssueKind {
    /// A digest recorded in an index does not match the stored bytes.
    ChecksumMismatch,
    /// A size recorded in an index does not match the stored bytes.
    SizeMismatch,
    /// A file referenced by an index does not exist in storage.
    MissingFile,
    /// A stored package is not referenced by any index.
    OrphanedPackage,
    /// A package referenced by an index is not present in storage.
    MissingPackage,
    /// A declared package count disagrees with the actual entry count.
    CountMismatch,
    /// An index contains more than one record of the same type.
    DuplicateType,
    /// A required metadata record is absent.
    MissingMetadata,
    /// A sqlite mirror is unreadable or its schema is incomplete.
    SqliteSchema,
    /// The sqlite mirror row count disagrees with the XML package count.
    SqliteCountMismatch,
    /// A document in the default namespace was serialized with prefixed elements.
    Namespace,
    /// The document could not be parsed at all.
    Unparseable,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ChecksumMismatch => "checksum-mismatch",
            Self::SizeMismatch => "size-mismatch",
            Self::MissingFile => "missing-file",
            Self::OrphanedPackage => "orphaned-package",
            Self::MissingPackage => "missing-package",
            Self::CountMismatch => "count-mismatch",
            Self::DuplicateType => "duplicate-type",
            Self::MissingMetadata => "missing-metadata",
            Self::SqliteSchema => "sqlite-schema",
            Self::SqliteCountMismatch => "sqlite-count-mismatch",
            Self::Namespace => "namespace",
            Self::Unparseable => "unparseable",
        };

        write!(f, "{}", s)
    }
}

/// A single validation finding. An empty issue list means validation passed.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub detail: String,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, detail: impl ToString) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}
