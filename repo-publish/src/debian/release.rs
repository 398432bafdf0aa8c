// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` index documents.

The `Release` file at `dists/<codename>/Release` is the top-level index of a
distribution: header fields describing the repository plus `MD5Sum`, `SHA1`,
and `SHA256` blocks listing every index file with its size and digest, by
path relative to the distribution directory.
*/

use {
    crate::{
        debian::control::parse_paragraphs,
        error::{RepoPublishError, Result},
        io::multi_digest_path,
    },
    chrono::{DateTime, Utc},
    std::{collections::BTreeMap, path::Path},
};

/// Date format used in `Release` files, e.g. `Sat, 02 Aug 2025 12:00:00 UTC`.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// One row in a digest block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseEntry {
    pub digest: String,
    pub size: u64,
    /// Path relative to `dists/<codename>/`.
    pub path: String,
}

impl ReleaseEntry {
    /// Render the row: a leading space, the digest, two spaces, the size
    /// right-justified to at least eight columns, two spaces, the path.
    fn render(&self) -> String {
        format!(" {}  {:>8}  {}", self.digest, self.size, self.path)
    }

    fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();

        let digest = parts
            .next()
            .ok_or_else(|| RepoPublishError::MetadataParse("digest missing from index row".into()))?
            .to_string();
        let size = parts
            .next()
            .ok_or_else(|| RepoPublishError::MetadataParse("size missing from index row".into()))?
            .parse::<u64>()?;
        let path = parts
            .next()
            .ok_or_else(|| RepoPublishError::MetadataParse("path missing from index row".into()))?
            .to_string();

        if parts.next().is_some() {
            return Err(RepoPublishError::MetadataParse(format!(
                "index row has trailing content: {}",
                line
            )));
        }

        Ok(Self { digest, size, path })
    }
}

/// A parsed or constructed `Release` file.
#[derive(Clone, Debug, Default)]
pub struct ReleaseFile {
    pub origin: String,
    pub label: String,
    pub suite: String,
    pub codename: String,
    pub date: String,
    pub architectures: Vec<String>,
    pub components: Vec<String>,
    pub description: String,
    pub md5_entries: Vec<ReleaseEntry>,
    pub sha1_entries: Vec<ReleaseEntry>,
    pub sha256_entries: Vec<ReleaseEntry>,
}

impl ReleaseFile {
    /// Parse a `Release` document.
    pub fn parse(data: &[u8]) -> Result<Self> {
        // Digest blocks are multiline fields: the block name is the field
        // name and each row is a continuation line.
        let paragraphs = parse_paragraphs(std::io::Cursor::new(data))?;
        let paragraph = paragraphs
            .into_iter()
            .next()
            .ok_or_else(|| RepoPublishError::MetadataParse("Release file is empty".into()))?;

        let field = |name: &str| paragraph.field_str(name).unwrap_or_default().to_string();

        let parse_block = |name: &str| -> Result<Vec<ReleaseEntry>> {
            match paragraph.field_str(name) {
                Some(value) => value
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(ReleaseEntry::parse)
                    .collect(),
                None => Ok(vec![]),
            }
        };

        Ok(Self {
            origin: field("Origin"),
            label: field("Label"),
            suite: field("Suite"),
            codename: field("Codename"),
            date: field("Date"),
            architectures: field("Architectures")
                .split_whitespace()
                .map(String::from)
                .collect(),
            components: field("Components")
                .split_whitespace()
                .map(String::from)
                .collect(),
            description: field("Description"),
            md5_entries: parse_block("MD5Sum")?,
            sha1_entries: parse_block("SHA1")?,
            sha256_entries: parse_block("SHA256")?,
        })
    }

    /// Serialize: header fields, then the three digest blocks in
    /// `MD5Sum`, `SHA1`, `SHA256` order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();

        out.push_str(&format!("Origin: {}\n", self.origin));
        out.push_str(&format!("Label: {}\n", self.label));
        out.push_str(&format!("Suite: {}\n", self.suite));
        out.push_str(&format!("Codename: {}\n", self.codename));
        out.push_str(&format!("Date: {}\n", self.date));
        out.push_str(&format!("Architectures: {}\n", self.architectures.join(" ")));
        out.push_str(&format!("Components: {}\n", self.components.join(" ")));
        out.push_str(&format!("Description: {}\n", self.description));

        for (name, entries) in [
            ("MD5Sum", &self.md5_entries),
            ("SHA1", &self.sha1_entries),
            ("SHA256", &self.sha256_entries),
        ] {
            out.push_str(name);
            out.push_str(":\n");
            for entry in entries {
                out.push_str(&entry.render());
                out.push('\n');
            }
        }

        out.into_bytes()
    }

    /// The sha256 rows keyed by relative path.
    pub fn sha256_by_path(&self) -> BTreeMap<String, &ReleaseEntry> {
        self.sha256_entries
            .iter()
            .map(|entry| (entry.path.clone(), entry))
            .collect()
    }

    /// Build a `Release` file by digesting every `Packages*` file found
    /// under a local distribution directory.
    ///
    /// `dist_dir` is the staged copy of `dists/<codename>/`; entry paths are
    /// recorded relative to it.
    pub fn from_index_dir(
        dist_dir: &Path,
        origin: &str,
        label: &str,
        codename: &str,
        architectures: &[String],
        components: &[String],
        date: DateTime<Utc>,
    ) -> Result<Self> {
        let mut index_files = vec![];
        collect_packages_files(dist_dir, dist_dir, &mut index_files)?;
        index_files.sort();

        let mut release = Self {
            origin: origin.to_string(),
            label: label.to_string(),
            suite: codename.to_string(),
            codename: codename.to_string(),
            date: date.format(DATE_FORMAT).to_string(),
            architectures: architectures.to_vec(),
            components: components.to_vec(),
            description: format!("{} Debian Repository", origin),
            ..Default::default()
        };

        for relative in index_files {
            let full = dist_dir.join(&relative);
            let size = std::fs::metadata(&full)?.len();
            let digests = multi_digest_path(&full)?;

            release.md5_entries.push(ReleaseEntry {
                digest: digests.md5.digest_hex(),
                size,
                path: relative.clone(),
            });
            release.sha1_entries.push(ReleaseEntry {
                digest: digests.sha1.digest_hex(),
                size,
                path: relative.clone(),
            });
            release.sha256_entries.push(ReleaseEntry {
                digest: digests.sha256.digest_hex(),
                size,
                path: relative,
            });
        }

        Ok(release)
    }
}

fn collect_packages_files(dir: &Path, root: &Path, out: &mut Vec<String>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_packages_files(&path, root, out)?;
        } else if entry
            .file_name()
            .to_string_lossy()
            .starts_with("Packages")
        {
            let relative = path
                .strip_prefix(root)
                .expect("walked path must be under the walk root");
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    Ok(())
}
