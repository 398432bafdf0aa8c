// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Storage backend abstraction.

Canonical repository content lives behind a [StorageBackend]: an object
store addressed by `/`-separated relative keys with no real directory
semantics. Two drivers exist: an S3 driver ([s3::S3Backend]) and a local
filesystem driver ([local::LocalBackend]) which makes the engines testable
without credentials.

Contracts common to all drivers:

- Paths are `/`-separated relative keys.
- [StorageBackend::delete] is idempotent and swallows missing keys.
- [StorageBackend::list] treats its prefix as a directory: the prefix is
  normalized to end with `/` and returned names are relative to it, so a
  sibling prefix like `repodata.backup-...` never leaks into a listing of
  `repodata`.
- [StorageBackend::read] buffers the object in memory and is intended for
  metadata-sized objects only.
- No ordering guarantees exist across concurrent operations; the engines
  assume a single writer per repository.
*/

use {
    crate::{
        config::{Family, RepoConfig},
        error::{RepoPublishError, Result},
    },
    async_trait::async_trait,
    std::path::Path,
};

pub mod local;
pub mod s3;

/// Environment variable consulted for a credential profile when none is configured.
pub const PROFILE_ENV: &str = "REPO_PROFILE";

/// Byte-level I/O against a repository storage backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Whether an object exists at the given key.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Read an object fully into memory. For metadata-sized objects only.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Upload a local file to the given key.
    async fn write(&self, local_path: &Path, path: &str) -> Result<()>;

    /// Write a byte buffer to the given key.
    async fn write_bytes(&self, data: &[u8], path: &str) -> Result<()>;

    /// Delete the object at the given key. Missing keys are not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// List objects under a prefix, returning names relative to the prefix.
    ///
    /// `suffix` filters on the basename (e.g. `.rpm`).
    async fn list(&self, prefix: &str, suffix: Option<&str>) -> Result<Vec<String>>;

    /// Download every object under a prefix into a local directory.
    ///
    /// Returns the relative paths downloaded.
    async fn pull_tree(&self, remote_prefix: &str, local_dir: &Path) -> Result<Vec<String>>;

    /// Upload every file under a local directory to a prefix.
    ///
    /// Returns the relative paths uploaded.
    async fn push_tree(&self, local_dir: &Path, remote_prefix: &str) -> Result<Vec<String>>;

    /// Copy an object to a new key, server-side where the driver supports it.
    async fn copy(&self, src_path: &str, dst_path: &str) -> Result<()>;

    /// Human-readable backend description, as (label, value) pairs.
    fn describe(&self) -> Vec<(String, String)>;
}

/// Normalize a listing prefix so it addresses a "directory".
pub(crate) fn directory_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');

    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Construct a storage backend from configuration for a repository family.
///
/// `backend.type` selects the driver; family-specific keys
/// (`backend.<family>.*`) take precedence over the shared keys. The
/// credential profile falls back to the `REPO_PROFILE` environment variable
/// when no explicit profile is configured.
pub fn create_backend(config: &RepoConfig, family: Family) -> Result<Box<dyn StorageBackend>> {
    let backend_type = config
        .get_str_for_family(family, "backend.type")
        .unwrap_or_else(|| "s3".to_string());

    match backend_type.as_str() {
        "s3" => {
            let bucket = config
                .get_str_for_family(family, "backend.s3.bucket")
                .ok_or_else(|| {
                    RepoPublishError::Config(
                        "backend.s3.bucket is required for the s3 backend".to_string(),
                    )
                })?;

            let profile = config
                .get_str_for_family(family, "backend.s3.profile")
                .or_else(|| std::env::var(PROFILE_ENV).ok());

            let endpoint = config.get_str_for_family(family, "backend.s3.endpoint");

            Ok(Box::new(s3::S3Backend::new(
                bucket,
                profile.as_deref(),
                endpoint.as_deref(),
            )?))
        }
        "local" => {
            let base_path = config
                .get_str_for_family(family, "backend.local.path")
                .ok_or_else(|| {
                    RepoPublishError::Config(
                        "backend.local.path is required for the local backend".to_string(),
                    )
                })?;

            Ok(Box::new(local::LocalBackend::new(base_path)?))
        }
        other => Err(RepoPublishError::Config(format!(
            "unknown backend type: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod test {
    use {super::*, serde_json::Value};

    #[test]
    fn factory_rejects_unknown_backend() -> Result<()> {
        let mut config = RepoConfig::empty("/nonexistent/test.conf");
        config.set("backend.type", Value::from("ftp"))?;

        assert!(create_backend(&config, Family::Rpm).is_err());

        Ok(())
    }

    #[test]
    fn factory_requires_local_path() -> Result<()> {
        let mut config = RepoConfig::empty("/nonexistent/test.conf");
        config.set("backend.type", Value::from("local"))?;

        assert!(create_backend(&config, Family::Rpm).is_err());

        Ok(())
    }

    #[test]
    fn factory_honors_family_override() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = RepoConfig::empty("/nonexistent/test.conf");
        config.set("backend.type", Value::from("s3"))?;
        config.set("backend.deb.type", Value::from("local"))?;
        config.set(
            "backend.deb.local.path",
            Value::from(dir.path().to_str().unwrap()),
        )?;

        let backend = create_backend(&config, Family::Debian)?;
        let described = backend.describe();
        assert!(described
            .iter()
            .any(|(label, _)| label == "Storage"));

        Ok(())
    }

    #[test]
    fn directory_prefix_normalization() {
        assert_eq!(directory_prefix("el9/x86_64/repodata"), "el9/x86_64/repodata/");
        assert_eq!(directory_prefix("el9/x86_64/repodata/"), "el9/x86_64/repodata/");
        assert_eq!(directory_prefix(""), "");
    }
}
