// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM repository validation.

Two tiers. Quick validation runs after every mutation, before commit: index
checksums against stored bytes, package counts, sqlite row count, duplicate
record types. Full validation adds package closure in both directions,
sqlite schema checks, the namespace-prefix scan, and stale backup
detection.
*/

use {
    crate::{
        error::Result,
        io::{bzip2_decompress, gzip_decompress, sha256_bytes},
        rpm::{
            metadata::{MetadataDocument, MetadataFlavor},
            repomd::RepoMd,
            sqlite,
        },
        storage::StorageBackend,
        validation::{IssueKind, ValidationIssue},
    },
    std::collections::BTreeSet,
    std::io::Write,
};

/// Everything quick validation learned, so full validation and the engine
/// can reuse the fetched documents.
struct QuickState {
    issues: Vec<ValidationIssue>,
    repomd: Option<RepoMd>,
    primary: Option<MetadataDocument>,
}

/// Run quick validation against the live repository state.
pub async fn validate_quick(
    storage: &dyn StorageBackend,
    repo_path: &str,
) -> Result<Vec<ValidationIssue>> {
    Ok(quick_state(storage, repo_path).await?.issues)
}

/// Run full validation against the live repository state.
pub async fn validate_full(
    storage: &dyn StorageBackend,
    repo_path: &str,
) -> Result<Vec<ValidationIssue>> {
    let state = quick_state(storage, repo_path).await?;
    let mut issues = state.issues;

    let repomd = match &state.repomd {
        Some(repomd) => repomd,
        None => return Ok(issues),
    };

    // Namespace scan: the index and primary must not serialize
    // default-namespace children with a prefix.
    let repomd_text = storage
        .read(&format!("{}/repodata/repomd.xml", repo_path))
        .await?;
    let repomd_text = String::from_utf8_lossy(&repomd_text);
    if repomd_text.contains("<repo:") {
        issues.push(ValidationIssue::new(
            IssueKind::Namespace,
            "repomd.xml serializes default-namespace elements with a prefix",
        ));
    }

    if let Some(record) = repomd.record("primary") {
        if let Ok(data) = storage
            .read(&format!("{}/{}", repo_path, record.location))
            .await
        {
            if let Ok(text) = gzip_decompress(&data) {
                if String::from_utf8_lossy(&text).contains("<common:") {
                    issues.push(ValidationIssue::new(
                        IssueKind::Namespace,
                        "primary metadata serializes default-namespace elements with a prefix",
                    ));
                }
            }
        }
    }

    // Package closure, both directions.
    if let Some(primary) = &state.primary {
        let referenced = primary
            .packages
            .iter()
            .filter_map(|entry| entry.filename())
            .collect::<BTreeSet<_>>();

        let stored = storage
            .list(repo_path, Some(".rpm"))
            .await?
            .into_iter()
            .map(|name| name.rsplit('/').next().unwrap_or(&name).to_string())
            .collect::<BTreeSet<_>>();

        for name in referenced.difference(&stored) {
            issues.push(ValidationIssue::new(
                IssueKind::MissingPackage,
                format!("package in metadata but not in storage: {}", name),
            ));
        }

        for name in stored.difference(&referenced) {
            issues.push(ValidationIssue::new(
                IssueKind::OrphanedPackage,
                format!("package in storage but not in metadata: {}", name),
            ));
        }
    }

    // Sqlite schemas.
    for db_type in ["primary_db", "filelists_db", "other_db"] {
        let record = match repomd.record(db_type) {
            Some(record) => record,
            None => {
                issues.push(ValidationIssue::new(
                    IssueKind::MissingMetadata,
                    format!("no {} record in repomd.xml", db_type),
                ));
                continue;
            }
        };

        let data = match storage
            .read(&format!("{}/{}", repo_path, record.location))
            .await
        {
            Ok(data) => data,
            Err(_) => continue,
        };

        match extract_sqlite(&data) {
            Ok(db_file) => {
                for table in sqlite::expected_tables(db_type) {
                    match sqlite::has_table(db_file.path(), table) {
                        Ok(true) => {}
                        Ok(false) => {
                            issues.push(ValidationIssue::new(
                                IssueKind::SqliteSchema,
                                format!("{}: missing table {}", db_type, table),
                            ));
                        }
                        Err(e) => {
                            issues.push(ValidationIssue::new(
                                IssueKind::SqliteSchema,
                                format!("{}: {}", db_type, e),
                            ));
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                issues.push(ValidationIssue::new(
                    IssueKind::SqliteSchema,
                    format!("{}: not a readable database: {}", db_type, e),
                ));
            }
        }
    }

    Ok(issues)
}

async fn quick_state(storage: &dyn StorageBackend, repo_path: &str) -> Result<QuickState> {
    let mut issues = vec![];

    let repomd_bytes = match storage
        .read(&format!("{}/repodata/repomd.xml", repo_path))
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            issues.push(ValidationIssue::new(
                IssueKind::MissingFile,
                format!("{}/repodata/repomd.xml: {}", repo_path, e),
            ));
            return Ok(QuickState {
                issues,
                repomd: None,
                primary: None,
            });
        }
    };

    let repomd = match RepoMd::from_xml(&String::from_utf8_lossy(&repomd_bytes)) {
        Ok(repomd) => repomd,
        Err(e) => {
            issues.push(ValidationIssue::new(
                IssueKind::Unparseable,
                format!("repomd.xml: {}", e),
            ));
            return Ok(QuickState {
                issues,
                repomd: None,
                primary: None,
            });
        }
    };

    for data_type in repomd.duplicate_types() {
        issues.push(ValidationIssue::new(
            IssueKind::DuplicateType,
            format!("more than one {} record in repomd.xml", data_type),
        ));
    }

    let mut primary = None;
    let mut primary_db_bytes = None;

    for record in &repomd.data {
        let path = format!("{}/{}", repo_path, record.location);

        let data = match storage.read(&path).await {
            Ok(data) => data,
            Err(_) => {
                issues.push(ValidationIssue::new(
                    IssueKind::MissingFile,
                    format!("missing file: {}", path),
                ));
                continue;
            }
        };

        let actual = sha256_bytes(&data);
        if actual != record.checksum {
            issues.push(ValidationIssue::new(
                IssueKind::ChecksumMismatch,
                format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    record.data_type, record.checksum, actual
                ),
            ));
        }

        if record.size != data.len() as u64 {
            issues.push(ValidationIssue::new(
                IssueKind::SizeMismatch,
                format!(
                    "size mismatch for {}: expected {}, got {}",
                    record.data_type,
                    record.size,
                    data.len()
                ),
            ));
        }

        match record.data_type.as_str() {
            "primary" => match MetadataDocument::parse_gz(MetadataFlavor::Primary, &data) {
                Ok(document) => primary = Some(document),
                Err(e) => {
                    issues.push(ValidationIssue::new(
                        IssueKind::Unparseable,
                        format!("primary metadata: {}", e),
                    ));
                }
            },
            "primary_db" => primary_db_bytes = Some(data),
            _ => {}
        }
    }

    if let Some(primary) = &primary {
        if primary.declared_count != primary.packages.len() {
            issues.push(ValidationIssue::new(
                IssueKind::CountMismatch,
                format!(
                    "primary declares {} packages but contains {}",
                    primary.declared_count,
                    primary.packages.len()
                ),
            ));
        }

        match primary_db_bytes {
            Some(data) => match extract_sqlite(&data) {
                Ok(db_file) => match sqlite::packages_row_count(db_file.path()) {
                    Ok(count) => {
                        if count != primary.packages.len() as u64 {
                            issues.push(ValidationIssue::new(
                                IssueKind::SqliteCountMismatch,
                                format!(
                                    "primary_db has {} rows but primary has {} packages",
                                    count,
                                    primary.packages.len()
                                ),
                            ));
                        }
                    }
                    Err(e) => {
                        issues.push(ValidationIssue::new(
                            IssueKind::SqliteSchema,
                            format!("primary_db: {}", e),
                        ));
                    }
                },
                Err(e) => {
                    issues.push(ValidationIssue::new(
                        IssueKind::SqliteSchema,
                        format!("primary_db: not a readable database: {}", e),
                    ));
                }
            },
            None => {
                issues.push(ValidationIssue::new(
                    IssueKind::MissingMetadata,
                    "no primary_db record in repomd.xml",
                ));
            }
        }
    } else if issues.is_empty() {
        issues.push(ValidationIssue::new(
            IssueKind::MissingMetadata,
            "no primary record in repomd.xml",
        ));
    }

    Ok(QuickState {
        issues,
        repomd: Some(repomd),
        primary,
    })
}

/// Decompress a bzip2 sqlite payload into a temporary file rusqlite can open.
fn extract_sqlite(data: &[u8]) -> Result<tempfile::NamedTempFile> {
    let decompressed = bzip2_decompress(data)?;

    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&decompressed)?;
    file.flush()?;

    Ok(file)
}
