// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository validation.

Quick validation checks the `Release` digest rows against the stored index
files. Full validation adds pool closure in both directions across every
`Packages` index the `Release` references.
*/

use {
    crate::{
        debian::{packages::PackagesIndex, release::ReleaseFile},
        error::Result,
        inspect::DebCoordinate,
        io::{gzip_decompress, sha256_bytes},
        storage::StorageBackend,
        validation::{IssueKind, ValidationIssue},
    },
    std::collections::BTreeSet,
};

/// Run quick validation: Release closure over every referenced index file.
pub async fn validate_quick(
    storage: &dyn StorageBackend,
    coordinate: &DebCoordinate,
) -> Result<Vec<ValidationIssue>> {
    Ok(quick_state(storage, coordinate).await?.0)
}

/// Run full validation: quick plus pool closure in both directions.
pub async fn validate_full(
    storage: &dyn StorageBackend,
    coordinate: &DebCoordinate,
) -> Result<Vec<ValidationIssue>> {
    let (mut issues, release) = quick_state(storage, coordinate).await?;

    let release = match release {
        Some(release) => release,
        None => return Ok(issues),
    };

    let dists_path = coordinate.dists_path();

    // Walk every uncompressed Packages index this distribution's Release
    // names, verifying that each referenced pool object exists.
    for entry in &release.sha256_entries {
        if !entry.path.ends_with("/Packages") {
            continue;
        }

        let data = match storage
            .read(&format!("{}/{}", dists_path, entry.path))
            .await
        {
            Ok(data) => data,
            Err(_) => continue,
        };

        let index = match PackagesIndex::parse(&data) {
            Ok(index) => index,
            Err(e) => {
                issues.push(ValidationIssue::new(
                    IssueKind::Unparseable,
                    format!("{}: {}", entry.path, e),
                ));
                continue;
            }
        };

        for stanza in index.iter() {
            match stanza.field_str("Filename") {
                Some(filename) => {
                    if !storage.exists(filename).await? {
                        issues.push(ValidationIssue::new(
                            IssueKind::MissingPackage,
                            format!("package in metadata but not in storage: {}", filename),
                        ));
                    }
                }
                None => {
                    issues.push(ValidationIssue::new(
                        IssueKind::MissingMetadata,
                        format!(
                            "stanza without Filename in {}: {}",
                            entry.path,
                            stanza.field_str("Package").unwrap_or("<unknown>")
                        ),
                    ));
                }
            }
        }
    }

    // Orphan detection consults every distribution in the backend: the pool
    // is shared, so a package only referenced by another codename is not an
    // orphan.
    let referenced_pool = all_referenced_pool_paths(storage).await?;

    let stored = storage
        .list("pool", Some(".deb"))
        .await?
        .into_iter()
        .map(|name| format!("pool/{}", name))
        .collect::<BTreeSet<_>>();

    for object in stored.difference(&referenced_pool) {
        issues.push(ValidationIssue::new(
            IssueKind::OrphanedPackage,
            format!("package in storage but not in metadata: {}", object),
        ));
    }

    Ok(issues)
}

/// Pool paths referenced by any `Packages` index of any distribution.
async fn all_referenced_pool_paths(
    storage: &dyn StorageBackend,
) -> Result<BTreeSet<String>> {
    let mut referenced = BTreeSet::new();

    for name in storage.list("dists", None).await? {
        if !name.ends_with("/Packages") {
            continue;
        }

        // Skip anything under a backup prefix sibling.
        if name.contains(".backup-") {
            continue;
        }

        if let Ok(data) = storage.read(&format!("dists/{}", name)).await {
            if let Ok(index) = PackagesIndex::parse(&data) {
                for path in index.pool_paths() {
                    referenced.insert(path);
                }
            }
        }
    }

    Ok(referenced)
}

async fn quick_state(
    storage: &dyn StorageBackend,
    coordinate: &DebCoordinate,
) -> Result<(Vec<ValidationIssue>, Option<ReleaseFile>)> {
    let mut issues = vec![];
    let dists_path = coordinate.dists_path();
    let release_path = format!("{}/Release", dists_path);

    let release_bytes = match storage.read(&release_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            issues.push(ValidationIssue::new(
                IssueKind::MissingFile,
                format!("{}: {}", release_path, e),
            ));
            return Ok((issues, None));
        }
    };

    let release = match ReleaseFile::parse(&release_bytes) {
        Ok(release) => release,
        Err(e) => {
            issues.push(ValidationIssue::new(
                IssueKind::Unparseable,
                format!("{}: {}", release_path, e),
            ));
            return Ok((issues, None));
        }
    };

    // The target index must be listed.
    let target = format!("{}/Packages", coordinate.relative_index_dir());
    if !release
        .sha256_entries
        .iter()
        .any(|entry| entry.path == target)
    {
        issues.push(ValidationIssue::new(
            IssueKind::MissingMetadata,
            format!("Release does not list {}", target),
        ));
    }

    for entry in &release.sha256_entries {
        let path = format!("{}/{}", dists_path, entry.path);

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
        if actual != entry.digest {
            issues.push(ValidationIssue::new(
                IssueKind::ChecksumMismatch,
                format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    entry.path, entry.digest, actual
                ),
            ));
        }

        if entry.size != data.len() as u64 {
            issues.push(ValidationIssue::new(
                IssueKind::SizeMismatch,
                format!(
                    "size mismatch for {}: expected {}, got {}",
                    entry.path,
                    entry.size,
                    data.len()
                ),
            ));
        }

        // A compressed variant must decompress to the uncompressed sibling.
        if entry.path.ends_with("/Packages.gz") {
            let plain_path = entry.path.trim_end_matches(".gz");
            if let Ok(plain) = storage.read(&format!("{}/{}", dists_path, plain_path)).await {
                match gzip_decompress(&data) {
                    Ok(decompressed) if decompressed == plain => {}
                    _ => {
                        issues.push(ValidationIssue::new(
                            IssueKind::ChecksumMismatch,
                            format!(
                                "{} does not decompress to {}",
                                entry.path, plain_path
                            ),
                        ));
                    }
                }
            }
        }
    }

    Ok((issues, Some(release)))
}
