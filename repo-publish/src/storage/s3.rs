// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! S3 storage backend.

Implements the storage contract over an S3 bucket. Credentials are resolved
through the standard AWS chain unless a named profile is configured; an
endpoint override selects S3-compatible services. Transport-level retries
are left to the SDK's default policy; the engines never retry on top.
*/

use {
    crate::{
        error::{RepoPublishError, Result},
        storage::{directory_prefix, StorageBackend},
    },
    async_trait::async_trait,
    rusoto_core::{ByteStream, HttpClient, Region, RusotoError},
    rusoto_credential::{ChainProvider, ProfileProvider},
    rusoto_s3::{
        CopyObjectRequest, DeleteObjectRequest, GetObjectError, GetObjectRequest,
        HeadObjectError, HeadObjectRequest, ListObjectsV2Request, PutObjectRequest, S3Client, S3,
    },
    std::path::Path,
    tokio::io::AsyncReadExt,
};

/// Storage backend bound to an S3 bucket.
pub struct S3Backend {
    client: S3Client,
    bucket: String,
    profile: Option<String>,
    endpoint: Option<String>,
}

impl S3Backend {
    /// Construct a backend for a bucket with optional profile and endpoint override.
    pub fn new(
        bucket: impl ToString,
        profile: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                name: "custom".to_string(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
            },
            None => Region::default(),
        };

        let dispatcher = HttpClient::new()
            .map_err(|e| RepoPublishError::StorageUnavailable(format!("HTTP client: {:?}", e)))?;

        let client = match profile {
            Some(profile) if profile != "default" => {
                let mut provider = ProfileProvider::new().map_err(|e| {
                    RepoPublishError::StorageUnavailable(format!("credential profile: {:?}", e))
                })?;
                provider.set_profile(profile);

                S3Client::new_with(dispatcher, provider, region)
            }
            _ => S3Client::new_with(dispatcher, ChainProvider::new(), region),
        };

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            profile: profile.map(String::from),
            endpoint: endpoint.map(String::from),
        })
    }

    fn key(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn map_unknown<E: std::error::Error + 'static>(
        path: &str,
        error: RusotoError<E>,
    ) -> RepoPublishError {
        match error {
            RusotoError::Unknown(resp) if resp.status.as_u16() == 404 => {
                RepoPublishError::NotFound(path.to_string())
            }
            RusotoError::Unknown(resp) if resp.status.as_u16() == 403 => {
                RepoPublishError::AccessDenied(path.to_string())
            }
            other => RepoPublishError::StorageUnavailable(format!("{}: {:?}", path, other)),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = vec![];
        let mut continuation_token = None;

        loop {
            let request = ListObjectsV2Request {
                bucket: self.bucket.clone(),
                prefix: Some(prefix.to_string()),
                continuation_token: continuation_token.clone(),
                ..Default::default()
            };

            let output = self
                .client
                .list_objects_v2(request)
                .await
                .map_err(|e| Self::map_unknown(prefix, e))?;

            if let Some(contents) = output.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        keys.push(key);
                    }
                }
            }

            if output.is_truncated.unwrap_or(false) {
                continuation_token = output.next_continuation_token;
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn exists(&self, path: &str) -> Result<bool> {
        let request = HeadObjectRequest {
            bucket: self.bucket.clone(),
            key: Self::key(path),
            ..Default::default()
        };

        match self.client.head_object(request).await {
            Ok(_) => Ok(true),
            Err(RusotoError::Service(HeadObjectError::NoSuchKey(_))) => Ok(false),
            Err(RusotoError::Unknown(resp)) if resp.status.as_u16() == 404 => Ok(false),
            Err(e) => Err(Self::map_unknown(path, e)),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: Self::key(path),
            ..Default::default()
        };

        match self.client.get_object(request).await {
            Ok(output) => {
                let body = output
                    .body
                    .ok_or_else(|| RepoPublishError::NotFound(path.to_string()))?;

                let mut data = vec![];
                body.into_async_read()
                    .read_to_end(&mut data)
                    .await
                    .map_err(|e| RepoPublishError::StoragePath(path.to_string(), e))?;

                Ok(data)
            }
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => {
                Err(RepoPublishError::NotFound(path.to_string()))
            }
            Err(e) => Err(Self::map_unknown(path, e)),
        }
    }

    async fn write(&self, local_path: &Path, path: &str) -> Result<()> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| RepoPublishError::StoragePath(path.to_string(), e))?;

        self.write_bytes(&data, path).await
    }

    async fn write_bytes(&self, data: &[u8], path: &str) -> Result<()> {
        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: Self::key(path),
            body: Some(ByteStream::from(data.to_vec())),
            ..Default::default()
        };

        self.client
            .put_object(request)
            .await
            .map_err(|e| Self::map_unknown(path, e))?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let request = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            key: Self::key(path),
            ..Default::default()
        };

        // DeleteObject succeeds on missing keys, which gives us idempotency.
        self.client
            .delete_object(request)
            .await
            .map_err(|e| Self::map_unknown(path, e))?;

        Ok(())
    }

    async fn list(&self, prefix: &str, suffix: Option<&str>) -> Result<Vec<String>> {
        let normalized = directory_prefix(prefix);
        let keys = self.list_keys(&normalized).await?;

        let mut names = keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&normalized).map(String::from))
            .filter(|name| !name.is_empty())
            .filter(|name| match suffix {
                Some(suffix) => name
                    .rsplit('/')
                    .next()
                    .map(|base| base.ends_with(suffix))
                    .unwrap_or(false),
                None => true,
            })
            .collect::<Vec<_>>();

        names.sort();

        Ok(names)
    }

    async fn pull_tree(&self, remote_prefix: &str, local_dir: &Path) -> Result<Vec<String>> {
        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|e| RepoPublishError::StoragePath(remote_prefix.to_string(), e))?;

        let names = self.list(remote_prefix, None).await?;
        let normalized = directory_prefix(remote_prefix);

        for name in &names {
            let data = self.read(&format!("{}{}", normalized, name)).await?;
            let dst = local_dir.join(name);

            if let Some(parent) = dst.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RepoPublishError::StoragePath(name.clone(), e))?;
            }

            tokio::fs::write(&dst, data)
                .await
                .map_err(|e| RepoPublishError::StoragePath(name.clone(), e))?;
        }

        Ok(names)
    }

    async fn push_tree(&self, local_dir: &Path, remote_prefix: &str) -> Result<Vec<String>> {
        let mut names = vec![];
        collect_local_files(local_dir, local_dir, &mut names)
            .map_err(|e| RepoPublishError::StoragePath(remote_prefix.to_string(), e))?;
        names.sort();

        let normalized = directory_prefix(remote_prefix);

        for name in &names {
            self.write(&local_dir.join(name), &format!("{}{}", normalized, name))
                .await?;
        }

        Ok(names)
    }

    async fn copy(&self, src_path: &str, dst_path: &str) -> Result<()> {
        let request = CopyObjectRequest {
            bucket: self.bucket.clone(),
            copy_source: format!("{}/{}", self.bucket, Self::key(src_path)),
            key: Self::key(dst_path),
            ..Default::default()
        };

        self.client
            .copy_object(request)
            .await
            .map_err(|e| Self::map_unknown(src_path, e))?;

        Ok(())
    }

    fn describe(&self) -> Vec<(String, String)> {
        let mut info = vec![("S3 Bucket".to_string(), self.bucket.clone())];

        info.push((
            "AWS Profile".to_string(),
            self.profile.clone().unwrap_or_else(|| "default".to_string()),
        ));

        if let Some(endpoint) = &self.endpoint {
            info.push(("S3 Endpoint".to_string(), endpoint.clone()));
            info.push((
                "S3 URL".to_string(),
                format!("{}/{}", endpoint, self.bucket),
            ));
        } else {
            info.push((
                "S3 URL".to_string(),
                format!("https://{}.s3.amazonaws.com", self.bucket),
            ));
        }

        info
    }
}

fn collect_local_files(
    dir: &Path,
    root: &Path,
    out: &mut Vec<String>,
) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_local_files(&path, root, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .expect("walked path must be under the walk root");
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_normalization() {
        assert_eq!(S3Backend::key("/el9/x86_64/repomd.xml"), "el9/x86_64/repomd.xml");
        assert_eq!(S3Backend::key("el9/x86_64/"), "el9/x86_64");
    }
}
