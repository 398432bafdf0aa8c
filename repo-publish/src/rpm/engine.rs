// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The RPM repository engine.

Implements add, remove, and validate over a storage backend. Mutations are
transactional: live metadata is snapshotted before the first write, the new
metadata generation is staged locally, packages upload before metadata, the
index uploads last, and quick validation gates the commit. Any failure
rewinds the metadata prefix from the snapshot.
*/

use {
    crate::{
        config::{Family, RepoConfig},
        error::{RepoPublishError, Result},
        inspect::{RpmCoordinate, RpmPackage},
        io::{bzip2_decompress, content_addressed_name, gzip_compress, sha256_bytes},
        ops::{AddOutcome, RemoveOutcome},
        rpm::{
            metadata::{MetadataDocument, MetadataFlavor},
            repomd::{RepoMd, RepoMdData},
            sqlite, validate,
        },
        storage::{create_backend, StorageBackend},
        tools::{run_createrepo, SystemInvoker, ToolInvoker},
        transaction::Transaction,
        validation::ValidationIssue,
    },
    chrono::Utc,
    slog::{info, warn, Logger},
    std::{
        collections::{HashMap, HashSet},
        path::{Path, PathBuf},
    },
};

/// YUM/DNF repository manager bound to one storage backend.
pub struct RpmRepository {
    storage: Box<dyn StorageBackend>,
    invoker: Box<dyn ToolInvoker>,
    logger: Logger,
    cache_dir: PathBuf,
    validation_enabled: bool,
    backup_enabled: bool,
}

impl RpmRepository {
    pub fn new(
        storage: Box<dyn StorageBackend>,
        invoker: Box<dyn ToolInvoker>,
        logger: Logger,
        cache_dir: PathBuf,
        validation_enabled: bool,
        backup_enabled: bool,
    ) -> Self {
        Self {
            storage,
            invoker,
            logger,
            cache_dir,
            validation_enabled,
            backup_enabled,
        }
    }

    /// Construct from configuration, using the system tool invoker.
    pub fn from_config(config: &RepoConfig, logger: Logger) -> Result<Self> {
        let storage = create_backend(config, Family::Rpm)?;

        Ok(Self::new(
            storage,
            Box::new(SystemInvoker),
            logger,
            config.cache_dir(Family::Rpm),
            config.get_bool("validation.enabled", true),
            config.get_bool("behavior.backup", true),
        ))
    }

    pub fn storage(&self) -> &dyn StorageBackend {
        self.storage.as_ref()
    }

    /// Add packages to the repository identified by their own metadata.
    ///
    /// All inputs must resolve to the same `(el_version, arch)` coordinate.
    pub async fn add_packages(&self, files: &[PathBuf]) -> Result<AddOutcome> {
        if files.is_empty() {
            return Ok(AddOutcome::default());
        }

        for file in files {
            if !file.is_file() {
                return Err(RepoPublishError::MalformedPackage(
                    file.to_string_lossy().to_string(),
                    "no such file".to_string(),
                ));
            }
        }

        let packages = files
            .iter()
            .map(|file| RpmPackage::inspect(self.invoker.as_ref(), file))
            .collect::<Result<Vec<_>>>()?;

        let coordinate = packages[0].coordinate();
        for package in &packages {
            if package.coordinate() != coordinate {
                return Err(RepoPublishError::MixedTargets(format!(
                    "expected {}, found {}/{} in {}",
                    coordinate,
                    package.el_version,
                    package.arch,
                    package.filename()
                )));
            }
        }

        info!(
            self.logger,
            "target: {} ({} package(s))",
            coordinate,
            packages.len()
        );

        let repo_path = coordinate.repo_path();
        let repodata_prefix = format!("{}/repodata", repo_path);
        let staging = self.fresh_staging(&repo_path)?;

        let repo_exists = self
            .storage
            .exists(&format!("{}/repomd.xml", repodata_prefix))
            .await?;

        let mut txn = Transaction::begin(
            self.storage.as_ref(),
            &repodata_prefix,
            &self.logger,
            self.backup_enabled,
        )
        .await?;

        match self
            .add_inner(&packages, &repo_path, &staging, repo_exists)
            .await
        {
            Ok(Some(outcome)) => {
                txn.commit().await?;
                info!(
                    self.logger,
                    "published {} package(s) to {}",
                    outcome.published.len(),
                    repo_path
                );
                Ok(outcome)
            }
            Ok(None) => {
                // Everything was a duplicate. Nothing was written.
                txn.abandon().await?;
                info!(self.logger, "all packages already exist; nothing to do");
                Ok(AddOutcome {
                    duplicates: packages.iter().map(|p| p.filename()).collect(),
                    ..Default::default()
                })
            }
            Err(e) => {
                warn!(self.logger, "operation failed: {}", e);
                txn.restore().await?;
                Err(e)
            }
        }
    }

    async fn add_inner(
        &self,
        packages: &[RpmPackage],
        repo_path: &str,
        staging: &Path,
        repo_exists: bool,
    ) -> Result<Option<AddOutcome>> {
        let repodata_prefix = format!("{}/repodata", repo_path);
        let repodata_dir = staging.join("repodata");

        let mut outcome = AddOutcome::default();
        let mut work: Vec<&RpmPackage> = vec![];

        if repo_exists {
            self.storage
                .pull_tree(&repodata_prefix, &repodata_dir)
                .await?;

            let existing = self.existing_checksums(&repodata_dir);

            for package in packages {
                let filename = package.filename();

                match existing.get(&filename) {
                    Some(checksum) if checksum == &package.sha256 => {
                        info!(self.logger, "skipping duplicate: {}", filename);
                        outcome.duplicates.push(filename);
                    }
                    Some(_) => {
                        info!(self.logger, "updating changed package: {}", filename);
                        outcome.updated.push(filename.clone());
                        outcome.published.push(filename);
                        work.push(package);
                    }
                    None => {
                        outcome.published.push(filename);
                        work.push(package);
                    }
                }
            }

            if work.is_empty() {
                return Ok(None);
            }
        } else {
            outcome.published = packages.iter().map(|p| p.filename()).collect();
            work.extend(packages.iter());
        }

        // Generate metadata for the incoming packages only.
        let generated_dir = staging.join("incoming");
        std::fs::create_dir_all(&generated_dir)?;
        for package in &work {
            std::fs::copy(
                &package.local_path,
                generated_dir.join(package.filename()),
            )?;
        }
        run_createrepo(self.invoker.as_ref(), &generated_dir)?;

        let generated = self.load_documents(&generated_dir.join("repodata"))?;

        let (primary, filelists, other) = if repo_exists {
            let (mut primary, mut filelists, mut other) = self.load_documents(&repodata_dir)?;

            // Entries for incoming filenames are replaced wholesale, which
            // also covers update classifications.
            let incoming = work
                .iter()
                .map(|p| p.filename())
                .collect::<HashSet<_>>();
            let removed = primary.remove_by_filenames(&incoming);
            let pkgids = removed
                .iter()
                .filter_map(|entry| entry.pkgid.clone())
                .collect::<HashSet<_>>();
            let names = removed
                .iter()
                .map(|entry| entry.name.clone())
                .collect::<HashSet<_>>();
            filelists.remove_matching(&pkgids, &names);
            other.remove_matching(&pkgids, &names);

            primary.merge(generated.0);
            filelists.merge(generated.1);
            other.merge(generated.2);

            (primary, filelists, other)
        } else {
            generated
        };

        let out_dir = staging.join("repodata.out");
        let repomd = build_metadata_set(&out_dir, &primary, &filelists, &other)?;

        // Packages first, metadata second, the index last.
        for package in &work {
            self.storage
                .write(
                    &package.local_path,
                    &format!("{}/{}", repo_path, package.filename()),
                )
                .await?;
        }

        self.publish_metadata(&repodata_prefix, &out_dir, &repomd)
            .await?;
        self.quick_validate_gate(repo_path).await?;

        Ok(Some(outcome))
    }

    /// Remove packages by filename from the repository at `coordinate`.
    pub async fn remove_packages(
        &self,
        filenames: &[String],
        coordinate: &RpmCoordinate,
    ) -> Result<RemoveOutcome> {
        let repo_path = coordinate.repo_path();
        let repodata_prefix = format!("{}/repodata", repo_path);

        if !self
            .storage
            .exists(&format!("{}/repomd.xml", repodata_prefix))
            .await?
        {
            return Err(RepoPublishError::NotFound(format!(
                "repository does not exist: {}",
                repo_path
            )));
        }

        let staging = self.fresh_staging(&repo_path)?;

        let mut txn = Transaction::begin(
            self.storage.as_ref(),
            &repodata_prefix,
            &self.logger,
            self.backup_enabled,
        )
        .await?;

        match self
            .remove_inner(filenames, &repo_path, &staging)
            .await
        {
            Ok(outcome) => {
                txn.commit().await?;
                info!(
                    self.logger,
                    "removed {} package(s) from {}",
                    outcome.removed.len(),
                    repo_path
                );
                Ok(outcome)
            }
            Err(RepoPublishError::NothingToRemove) => {
                txn.abandon().await?;
                Err(RepoPublishError::NothingToRemove)
            }
            Err(e) => {
                warn!(self.logger, "operation failed: {}", e);
                txn.restore().await?;
                Err(e)
            }
        }
    }

    async fn remove_inner(
        &self,
        filenames: &[String],
        repo_path: &str,
        staging: &Path,
    ) -> Result<RemoveOutcome> {
        let repodata_prefix = format!("{}/repodata", repo_path);
        let repodata_dir = staging.join("repodata");

        self.storage
            .pull_tree(&repodata_prefix, &repodata_dir)
            .await?;

        let (mut primary, mut filelists, mut other) = self.load_documents(&repodata_dir)?;

        let listed = primary
            .packages
            .iter()
            .filter_map(|entry| entry.filename())
            .collect::<HashSet<_>>();

        let mut outcome = RemoveOutcome::default();
        for filename in filenames {
            if listed.contains(filename) {
                outcome.removed.push(filename.clone());
            } else {
                warn!(self.logger, "not found in repository: {}", filename);
                outcome.missing.push(filename.clone());
            }
        }

        if outcome.removed.is_empty() {
            return Err(RepoPublishError::NothingToRemove);
        }

        let removing = outcome.removed.iter().cloned().collect::<HashSet<_>>();
        let removed_entries = primary.remove_by_filenames(&removing);
        let pkgids = removed_entries
            .iter()
            .filter_map(|entry| entry.pkgid.clone())
            .collect::<HashSet<_>>();
        let names = removed_entries
            .iter()
            .map(|entry| entry.name.clone())
            .collect::<HashSet<_>>();
        filelists.remove_matching(&pkgids, &names);
        other.remove_matching(&pkgids, &names);

        let out_dir = staging.join("repodata.out");
        let repomd = build_metadata_set(&out_dir, &primary, &filelists, &other)?;

        for filename in &outcome.removed {
            self.storage
                .delete(&format!("{}/{}", repo_path, filename))
                .await?;
        }

        self.publish_metadata(&repodata_prefix, &out_dir, &repomd)
            .await?;
        self.quick_validate_gate(repo_path).await?;

        Ok(outcome)
    }

    /// Run full validation against the repository at `coordinate`.
    pub async fn validate(&self, coordinate: &RpmCoordinate) -> Result<Vec<ValidationIssue>> {
        let repo_path = coordinate.repo_path();

        if !self
            .storage
            .exists(&format!("{}/repodata/repomd.xml", repo_path))
            .await?
        {
            return Err(RepoPublishError::NotFound(format!(
                "repository does not exist: {}",
                repo_path
            )));
        }

        validate::validate_full(self.storage.as_ref(), &repo_path).await
    }

    /// Upload everything in `out_dir` except the index, then the index,
    /// then sweep unreferenced objects from the metadata prefix.
    async fn publish_metadata(
        &self,
        repodata_prefix: &str,
        out_dir: &Path,
        repomd: &RepoMd,
    ) -> Result<()> {
        let mut names = vec![];
        for entry in std::fs::read_dir(out_dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name != "repomd.xml" {
                names.push(name);
            }
        }
        names.sort();

        for name in &names {
            self.storage
                .write(&out_dir.join(name), &format!("{}/{}", repodata_prefix, name))
                .await?;
        }

        self.storage
            .write(
                &out_dir.join("repomd.xml"),
                &format!("{}/repomd.xml", repodata_prefix),
            )
            .await?;

        let referenced = repomd
            .referenced_basenames()
            .into_iter()
            .collect::<HashSet<_>>();

        for name in self.storage.list(repodata_prefix, None).await? {
            if !referenced.contains(&name) {
                self.storage
                    .delete(&format!("{}/{}", repodata_prefix, name))
                    .await?;
            }
        }

        Ok(())
    }

    /// Quick validation before commit. Any issue aborts the transaction.
    async fn quick_validate_gate(&self, repo_path: &str) -> Result<()> {
        if !self.validation_enabled {
            return Ok(());
        }

        let issues = validate::validate_quick(self.storage.as_ref(), repo_path).await?;
        if !issues.is_empty() {
            return Err(RepoPublishError::IntegrityViolation(issues));
        }

        Ok(())
    }

    /// `filename -> sha256` for packages already in the repository.
    ///
    /// Failure to read the existing metadata degrades to an empty map: the
    /// operation then treats every input as new rather than failing.
    fn existing_checksums(&self, repodata_dir: &Path) -> HashMap<String, String> {
        match self.load_documents(repodata_dir) {
            Ok((primary, _, _)) => primary.filename_checksums(),
            Err(e) => {
                warn!(self.logger, "could not check for duplicates: {}", e);
                HashMap::new()
            }
        }
    }

    /// Load primary, filelists, and other from a local repodata directory,
    /// resolving file names through its `repomd.xml`.
    fn load_documents(
        &self,
        repodata_dir: &Path,
    ) -> Result<(MetadataDocument, MetadataDocument, MetadataDocument)> {
        let repomd_text = std::fs::read_to_string(repodata_dir.join("repomd.xml"))?;
        let repomd = RepoMd::from_xml(&repomd_text)?;

        let mut documents = vec![];
        for flavor in MetadataFlavor::all() {
            let record = repomd.record(flavor.type_name()).ok_or(
                RepoPublishError::MetadataFileNotFound(flavor.type_name()),
            )?;

            let path = repodata_dir.join(record.basename());
            let data = std::fs::read(&path)
                .map_err(|e| RepoPublishError::StoragePath(record.location.clone(), e))?;

            let document = if record.basename().ends_with(".gz") {
                MetadataDocument::parse_gz(flavor, &data)?
            } else {
                MetadataDocument::parse(
                    flavor,
                    &String::from_utf8_lossy(&data),
                )?
            };

            documents.push(document);
        }

        let other = documents.pop().expect("three documents were loaded");
        let filelists = documents.pop().expect("three documents were loaded");
        let primary = documents.pop().expect("three documents were loaded");

        Ok((primary, filelists, other))
    }

    /// Create a clean per-repository staging directory.
    fn fresh_staging(&self, repo_path: &str) -> Result<PathBuf> {
        let staging = self.cache_dir.join(repo_path);

        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        Ok(staging)
    }
}

/// Write the full metadata generation into `out_dir`: the three XML
/// documents and three sqlite mirrors under content-addressed names, plus
/// `repomd.xml`. Returns the index.
fn build_metadata_set(
    out_dir: &Path,
    primary: &MetadataDocument,
    filelists: &MetadataDocument,
    other: &MetadataDocument,
) -> Result<RepoMd> {
    if out_dir.exists() {
        std::fs::remove_dir_all(out_dir)?;
    }
    std::fs::create_dir_all(out_dir)?;

    let timestamp = Utc::now().timestamp().max(0) as u64;
    let mut repomd = RepoMd {
        revision: timestamp.to_string(),
        data: vec![],
    };

    for document in [primary, filelists, other] {
        let xml = document.to_xml();
        let open_checksum = sha256_bytes(xml.as_bytes());
        let open_size = xml.len() as u64;

        let compressed = gzip_compress(xml.as_bytes())?;
        let checksum = sha256_bytes(&compressed);

        let name = content_addressed_name(&checksum, &document.flavor.file_base());
        std::fs::write(out_dir.join(&name), &compressed)?;

        repomd.set_record(RepoMdData {
            data_type: document.flavor.type_name().to_string(),
            checksum,
            open_checksum: Some(open_checksum),
            location: format!("repodata/{}", name),
            timestamp,
            size: compressed.len() as u64,
            open_size: Some(open_size),
            database_version: None,
        });
    }

    for (db_type, bz2_path) in sqlite::build_mirrors(out_dir, primary, filelists, other)? {
        let compressed = std::fs::read(&bz2_path)?;
        let checksum = sha256_bytes(&compressed);
        let uncompressed = bzip2_decompress(&compressed)?;

        let name = content_addressed_name(&checksum, &format!("{}.sqlite.bz2", db_type));
        std::fs::rename(&bz2_path, out_dir.join(&name))?;

        repomd.set_record(RepoMdData {
            data_type: db_type,
            checksum,
            open_checksum: Some(sha256_bytes(&uncompressed)),
            location: format!("repodata/{}", name),
            timestamp,
            size: compressed.len() as u64,
            open_size: Some(uncompressed.len() as u64),
            database_version: Some(10),
        });
    }

    std::fs::write(out_dir.join("repomd.xml"), repomd.to_xml()?)?;

    Ok(repomd)
}
