// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Local filesystem storage backend.

Implements the storage contract over a directory tree. This driver exists so
the repository engines can be exercised without object-store credentials;
semantics mirror the S3 driver (prefix listing, idempotent delete).
*/

use {
    crate::{
        error::{RepoPublishError, Result},
        storage::{directory_prefix, StorageBackend},
    },
    async_trait::async_trait,
    std::path::{Path, PathBuf},
};

/// Storage backend rooted at a base directory.
pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    /// Construct an instance rooted at the given base path.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path.trim_start_matches('/'))
    }

    fn map_io(path: &str, e: std::io::Error) -> RepoPublishError {
        match e.kind() {
            std::io::ErrorKind::NotFound => RepoPublishError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                RepoPublishError::AccessDenied(path.to_string())
            }
            _ => RepoPublishError::StoragePath(path.to_string(), e),
        }
    }

    fn collect_files(dir: &Path, root: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                Self::collect_files(&path, root, out)?;
            } else {
                let relative = path
                    .strip_prefix(root)
                    .expect("walked path must be under the walk root");
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).is_file())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(self.full_path(path)).map_err(|e| Self::map_io(path, e))
    }

    async fn write(&self, local_path: &Path, path: &str) -> Result<()> {
        let dst = self.full_path(path);

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::map_io(path, e))?;
        }

        std::fs::copy(local_path, &dst).map_err(|e| Self::map_io(path, e))?;

        Ok(())
    }

    async fn write_bytes(&self, data: &[u8], path: &str) -> Result<()> {
        let dst = self.full_path(path);

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::map_io(path, e))?;
        }

        std::fs::write(&dst, data).map_err(|e| Self::map_io(path, e))?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match std::fs::remove_file(self.full_path(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io(path, e)),
        }
    }

    async fn list(&self, prefix: &str, suffix: Option<&str>) -> Result<Vec<String>> {
        let normalized = directory_prefix(prefix);
        let dir = self.full_path(normalized.trim_end_matches('/'));

        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let mut names = vec![];
        Self::collect_files(&dir, &dir, &mut names).map_err(|e| Self::map_io(prefix, e))?;

        if let Some(suffix) = suffix {
            names.retain(|name| {
                name.rsplit('/')
                    .next()
                    .map(|base| base.ends_with(suffix))
                    .unwrap_or(false)
            });
        }

        names.sort();

        Ok(names)
    }

    async fn pull_tree(&self, remote_prefix: &str, local_dir: &Path) -> Result<Vec<String>> {
        std::fs::create_dir_all(local_dir)?;

        let names = self.list(remote_prefix, None).await?;
        let normalized = directory_prefix(remote_prefix);

        for name in &names {
            let src = self.full_path(&format!("{}{}", normalized, name));
            let dst = local_dir.join(name);

            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)?;
            }

            std::fs::copy(&src, &dst).map_err(|e| Self::map_io(name, e))?;
        }

        Ok(names)
    }

    async fn push_tree(&self, local_dir: &Path, remote_prefix: &str) -> Result<Vec<String>> {
        let mut names = vec![];

        if !local_dir.is_dir() {
            return Ok(names);
        }

        Self::collect_files(local_dir, local_dir, &mut names)
            .map_err(|e| Self::map_io(remote_prefix, e))?;
        names.sort();

        let normalized = directory_prefix(remote_prefix);

        for name in &names {
            self.write(&local_dir.join(name), &format!("{}{}", normalized, name))
                .await?;
        }

        Ok(names)
    }

    async fn copy(&self, src_path: &str, dst_path: &str) -> Result<()> {
        let src = self.full_path(src_path);
        let dst = self.full_path(dst_path);

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::map_io(dst_path, e))?;
        }

        std::fs::copy(&src, &dst).map_err(|e| Self::map_io(src_path, e))?;

        Ok(())
    }

    fn describe(&self) -> Vec<(String, String)> {
        vec![(
            "Storage".to_string(),
            format!("file://{}", self.base_path.display()),
        )]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn write_read_exists_delete() -> Result<()> {
        let (_dir, backend) = backend();

        assert!(!backend.exists("a/b.txt").await?);
        backend.write_bytes(b"content", "a/b.txt").await?;
        assert!(backend.exists("a/b.txt").await?);
        assert_eq!(backend.read("a/b.txt").await?, b"content");

        backend.delete("a/b.txt").await?;
        assert!(!backend.exists("a/b.txt").await?);

        // Idempotent delete.
        backend.delete("a/b.txt").await?;

        Ok(())
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (_dir, backend) = backend();

        assert!(matches!(
            backend.read("missing").await,
            Err(RepoPublishError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_scoped_to_directory() -> Result<()> {
        let (_dir, backend) = backend();

        backend.write_bytes(b"1", "el9/x86_64/repodata/repomd.xml").await?;
        backend.write_bytes(b"2", "el9/x86_64/repodata/primary.xml.gz").await?;
        backend
            .write_bytes(b"3", "el9/x86_64/repodata.backup-20250101-000000/repomd.xml")
            .await?;
        backend.write_bytes(b"4", "el9/x86_64/pkg.rpm").await?;

        let listed = backend.list("el9/x86_64/repodata", None).await?;
        assert_eq!(listed, vec!["primary.xml.gz", "repomd.xml"]);

        let rpms = backend.list("el9/x86_64", Some(".rpm")).await?;
        assert_eq!(rpms, vec!["pkg.rpm"]);

        Ok(())
    }

    #[tokio::test]
    async fn pull_and_push_trees() -> Result<()> {
        let (_dir, backend) = backend();
        let staging = tempfile::tempdir()?;

        backend.write_bytes(b"a", "prefix/one").await?;
        backend.write_bytes(b"b", "prefix/sub/two").await?;

        let pulled = backend.pull_tree("prefix", staging.path()).await?;
        assert_eq!(pulled, vec!["one", "sub/two"]);
        assert_eq!(std::fs::read(staging.path().join("sub/two"))?, b"b");

        let pushed = backend.push_tree(staging.path(), "copy").await?;
        assert_eq!(pushed, vec!["one", "sub/two"]);
        assert_eq!(backend.read("copy/sub/two").await?, b"b");

        Ok(())
    }

    #[tokio::test]
    async fn copy_within_storage() -> Result<()> {
        let (_dir, backend) = backend();

        backend.write_bytes(b"payload", "src/file").await?;
        backend.copy("src/file", "dst/nested/file").await?;
        assert_eq!(backend.read("dst/nested/file").await?, b"payload");

        Ok(())
    }
}
