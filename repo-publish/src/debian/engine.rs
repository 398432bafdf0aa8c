// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The Debian repository engine.

Shares the transaction, storage, and dedup skeleton with the RPM engine but
operates on `Packages`/`Release` documents and the `pool/` layout. The
`dists/<codename>/` tree is the metadata directory a transaction snapshots;
pool objects, like RPM packages, are outside the snapshot.
*/

use {
    crate::{
        config::{Family, RepoConfig},
        debian::{packages::PackagesIndex, release::ReleaseFile, validate},
        error::{RepoPublishError, Result},
        inspect::{DebCoordinate, DebPackage},
        io::{bzip2_compress, gzip_compress, gzip_decompress},
        ops::{AddOutcome, RemoveOutcome},
        storage::{create_backend, StorageBackend},
        tools::{SystemInvoker, ToolInvoker},
        transaction::Transaction,
        validation::ValidationIssue,
    },
    chrono::Utc,
    slog::{info, warn, Logger},
    std::{
        collections::BTreeSet,
        path::{Path, PathBuf},
    },
};

/// Index files that live next to `Release` and must survive sweeps even
/// though `Release` does not reference them.
const SWEEP_KEEP: &[&str] = &["Release", "InRelease", "Release.gpg"];

/// Repository identity fields and fallbacks from configuration.
#[derive(Clone, Debug)]
pub struct DebDefaults {
    pub distribution: String,
    pub component: String,
    pub architectures: Vec<String>,
    pub origin: String,
    pub label: String,
}

impl DebDefaults {
    pub fn from_config(config: &RepoConfig) -> Self {
        let get = |key: &str, fallback: &str| {
            config.get_str(key).unwrap_or_else(|| fallback.to_string())
        };

        Self {
            distribution: get("debian.default_distribution", "focal"),
            component: get("debian.default_component", "main"),
            architectures: get("debian.architectures", "amd64 arm64")
                .split_whitespace()
                .map(String::from)
                .collect(),
            origin: get("debian.origin", "Repo"),
            label: get("debian.label", "Repo"),
        }
    }
}

/// APT repository manager bound to one storage backend.
pub struct DebRepository {
    storage: Box<dyn StorageBackend>,
    invoker: Box<dyn ToolInvoker>,
    logger: Logger,
    cache_dir: PathBuf,
    validation_enabled: bool,
    backup_enabled: bool,
    defaults: DebDefaults,
}

impl DebRepository {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Box<dyn StorageBackend>,
        invoker: Box<dyn ToolInvoker>,
        logger: Logger,
        cache_dir: PathBuf,
        validation_enabled: bool,
        backup_enabled: bool,
        defaults: DebDefaults,
    ) -> Self {
        Self {
            storage,
            invoker,
            logger,
            cache_dir,
            validation_enabled,
            backup_enabled,
            defaults,
        }
    }

    /// Construct from configuration, using the system tool invoker.
    pub fn from_config(config: &RepoConfig, logger: Logger) -> Result<Self> {
        let storage = create_backend(config, Family::Debian)?;
        let defaults = DebDefaults::from_config(config);

        Ok(Self::new(
            storage,
            Box::new(SystemInvoker),
            logger,
            config.cache_dir(Family::Debian),
            config.get_bool("validation.enabled", true),
            config.get_bool("behavior.backup", true),
            defaults,
        ))
    }

    pub fn storage(&self) -> &dyn StorageBackend {
        self.storage.as_ref()
    }

    pub fn defaults(&self) -> &DebDefaults {
        &self.defaults
    }

    /// Add packages, deriving the coordinate from each package's control
    /// fields with optional CLI overrides.
    pub async fn add_packages(
        &self,
        files: &[PathBuf],
        distribution_override: Option<&str>,
        component_override: Option<&str>,
    ) -> Result<AddOutcome> {
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
            .map(|file| DebPackage::inspect(self.invoker.as_ref(), file))
            .collect::<Result<Vec<_>>>()?;

        let resolve = |package: &DebPackage| DebCoordinate {
            distribution: distribution_override
                .map(String::from)
                .or_else(|| package.distribution.clone())
                .unwrap_or_else(|| self.defaults.distribution.clone()),
            component: component_override
                .map(String::from)
                .or_else(|| package.component.clone())
                .unwrap_or_else(|| self.defaults.component.clone()),
            architecture: package.architecture.clone(),
        };

        let coordinate = resolve(&packages[0]);
        for package in &packages {
            let other = resolve(package);
            if other != coordinate {
                return Err(RepoPublishError::MixedTargets(format!(
                    "expected {}, found {} in {}",
                    coordinate,
                    other,
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

        let dists_prefix = coordinate.dists_path();
        let staging = self.fresh_staging(&coordinate.distribution)?;

        let mut txn = Transaction::begin(
            self.storage.as_ref(),
            &dists_prefix,
            &self.logger,
            self.backup_enabled,
        )
        .await?;

        match self.add_inner(&packages, &coordinate, &staging).await {
            Ok(Some(outcome)) => {
                txn.commit().await?;
                info!(
                    self.logger,
                    "published {} package(s) to {}",
                    outcome.published.len(),
                    coordinate
                );
                Ok(outcome)
            }
            Ok(None) => {
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
        packages: &[DebPackage],
        coordinate: &DebCoordinate,
        staging: &Path,
    ) -> Result<Option<AddOutcome>> {
        let dists_prefix = coordinate.dists_path();

        self.storage.pull_tree(&dists_prefix, staging).await?;

        let index_dir = staging.join(coordinate.relative_index_dir());
        std::fs::create_dir_all(&index_dir)?;

        let mut index = self.load_index(&index_dir)?;
        let existing = index.filename_checksums();

        let mut outcome = AddOutcome::default();
        let mut work: Vec<&DebPackage> = vec![];

        for package in packages {
            let filename = package.filename();

            match existing.get(&filename) {
                Some(checksum) if checksum == &package.digests.sha256.digest_hex() => {
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

        for package in &work {
            index.upsert_package(package, &package.pool_path(&coordinate.component));
        }

        self.write_index_files(&index_dir, &index)?;
        let release = self.build_release(staging, coordinate)?;

        // Pool objects first, index files second, Release last.
        for package in &work {
            self.storage
                .write(
                    &package.local_path,
                    &package.pool_path(&coordinate.component),
                )
                .await?;
        }

        self.publish_metadata(&dists_prefix, staging, coordinate, &release)
            .await?;
        self.quick_validate_gate(coordinate).await?;

        Ok(Some(outcome))
    }

    /// Remove packages matching the given selectors (`name` removes every
    /// version; `name_version` removes one).
    pub async fn remove_packages(
        &self,
        selectors: &[String],
        coordinate: &DebCoordinate,
    ) -> Result<RemoveOutcome> {
        let dists_prefix = coordinate.dists_path();
        let index_prefix = format!("{}/Packages", coordinate.index_path());

        if !self.storage.exists(&index_prefix).await? {
            return Err(RepoPublishError::NotFound(format!(
                "repository does not exist: {}",
                coordinate
            )));
        }

        let staging = self.fresh_staging(&coordinate.distribution)?;

        let mut txn = Transaction::begin(
            self.storage.as_ref(),
            &dists_prefix,
            &self.logger,
            self.backup_enabled,
        )
        .await?;

        match self.remove_inner(selectors, coordinate, &staging).await {
            Ok(outcome) => {
                txn.commit().await?;
                info!(
                    self.logger,
                    "removed {} package(s) from {}",
                    outcome.removed.len(),
                    coordinate
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
        selectors: &[String],
        coordinate: &DebCoordinate,
        staging: &Path,
    ) -> Result<RemoveOutcome> {
        let dists_prefix = coordinate.dists_path();

        self.storage.pull_tree(&dists_prefix, staging).await?;

        let index_dir = staging.join(coordinate.relative_index_dir());
        let mut index = self.load_index(&index_dir)?;

        let mut outcome = RemoveOutcome::default();
        let mut pool_paths = vec![];

        for selector in selectors {
            let removed = index.remove_matching(selector);

            if removed.is_empty() {
                warn!(self.logger, "not found in repository: {}", selector);
                outcome.missing.push(selector.clone());
                continue;
            }

            for stanza in removed {
                if let Some(filename) = stanza.field_str("Filename") {
                    outcome
                        .removed
                        .push(filename.rsplit('/').next().unwrap_or(filename).to_string());
                    pool_paths.push(filename.to_string());
                }
            }
        }

        if outcome.removed.is_empty() {
            return Err(RepoPublishError::NothingToRemove);
        }

        for pool_path in &pool_paths {
            self.storage.delete(pool_path).await?;
        }

        self.write_index_files(&index_dir, &index)?;
        let release = self.build_release(staging, coordinate)?;

        self.publish_metadata(&dists_prefix, staging, coordinate, &release)
            .await?;
        self.quick_validate_gate(coordinate).await?;

        Ok(outcome)
    }

    /// Run full validation against one (distribution, component,
    /// architecture) index and the pool.
    pub async fn validate(&self, coordinate: &DebCoordinate) -> Result<Vec<ValidationIssue>> {
        if !self
            .storage
            .exists(&format!("{}/Release", coordinate.dists_path()))
            .await?
        {
            return Err(RepoPublishError::NotFound(format!(
                "repository does not exist: {}",
                coordinate
            )));
        }

        validate::validate_full(self.storage.as_ref(), coordinate).await
    }

    /// Load the index for one (component, architecture) from the staged
    /// tree: the uncompressed `Packages`, or the `.gz` variant, or empty
    /// when the index does not exist yet.
    fn load_index(&self, index_dir: &Path) -> Result<PackagesIndex> {
        let plain = index_dir.join("Packages");
        if plain.is_file() {
            return PackagesIndex::parse(&std::fs::read(plain)?);
        }

        let gz = index_dir.join("Packages.gz");
        if gz.is_file() {
            let data = gzip_decompress(&std::fs::read(gz)?)?;
            return PackagesIndex::parse(&data);
        }

        Ok(PackagesIndex::default())
    }

    /// Write `Packages`, `Packages.gz`, and `Packages.bz2`.
    fn write_index_files(&self, index_dir: &Path, index: &PackagesIndex) -> Result<()> {
        std::fs::create_dir_all(index_dir)?;

        let plain = index.to_bytes();
        std::fs::write(index_dir.join("Packages"), &plain)?;
        std::fs::write(index_dir.join("Packages.gz"), gzip_compress(&plain)?)?;
        std::fs::write(index_dir.join("Packages.bz2"), bzip2_compress(&plain)?)?;

        Ok(())
    }

    /// Regenerate the `Release` file over the whole staged distribution
    /// tree and write it at the tree root.
    fn build_release(&self, staging: &Path, coordinate: &DebCoordinate) -> Result<ReleaseFile> {
        let mut architectures = self
            .defaults
            .architectures
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>();
        architectures.insert(coordinate.architecture.clone());

        let mut components = BTreeSet::from([coordinate.component.clone()]);

        // Other components and architectures already present in the tree
        // stay listed.
        for entry in std::fs::read_dir(staging)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }

            let component = entry.file_name().to_string_lossy().to_string();
            let mut has_index = false;

            for sub in std::fs::read_dir(entry.path())? {
                let name = sub?.file_name().to_string_lossy().to_string();
                if let Some(arch) = name.strip_prefix("binary-") {
                    has_index = true;
                    architectures.insert(arch.to_string());
                }
            }

            if has_index {
                components.insert(component);
            }
        }

        let release = ReleaseFile::from_index_dir(
            staging,
            &self.defaults.origin,
            &self.defaults.label,
            &coordinate.distribution,
            &architectures.into_iter().collect::<Vec<_>>(),
            &components.into_iter().collect::<Vec<_>>(),
            Utc::now(),
        )?;

        std::fs::write(staging.join("Release"), release.to_bytes())?;

        Ok(release)
    }

    /// Upload the mutated index files, then `Release` last, then sweep
    /// objects the new `Release` no longer references.
    async fn publish_metadata(
        &self,
        dists_prefix: &str,
        staging: &Path,
        coordinate: &DebCoordinate,
        release: &ReleaseFile,
    ) -> Result<()> {
        let index_dir = staging.join(coordinate.relative_index_dir());

        for name in ["Packages", "Packages.gz", "Packages.bz2"] {
            self.storage
                .write(
                    &index_dir.join(name),
                    &format!("{}/{}/{}", dists_prefix, coordinate.relative_index_dir(), name),
                )
                .await?;
        }

        self.storage
            .write(&staging.join("Release"), &format!("{}/Release", dists_prefix))
            .await?;

        let mut referenced = release
            .sha256_entries
            .iter()
            .map(|entry| entry.path.clone())
            .collect::<BTreeSet<_>>();
        for name in SWEEP_KEEP {
            referenced.insert(name.to_string());
        }

        for name in self.storage.list(dists_prefix, None).await? {
            if !referenced.contains(&name) {
                self.storage
                    .delete(&format!("{}/{}", dists_prefix, name))
                    .await?;
            }
        }

        Ok(())
    }

    async fn quick_validate_gate(&self, coordinate: &DebCoordinate) -> Result<()> {
        if !self.validation_enabled {
            return Ok(());
        }

        let issues = validate::validate_quick(self.storage.as_ref(), coordinate).await?;
        if !issues.is_empty() {
            return Err(RepoPublishError::IntegrityViolation(issues));
        }

        Ok(())
    }

    fn fresh_staging(&self, distribution: &str) -> Result<PathBuf> {
        let staging = self.cache_dir.join(distribution);

        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        Ok(staging)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{io::sha256_bytes, storage::local::LocalBackend, tools::ToolOutput},
        slog::{o, Discard},
        std::collections::BTreeMap,
    };

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    /// Stands in for `dpkg-deb -f`, deriving control fields from filenames
    /// shaped `name_version_arch.deb`.
    struct StubDpkg;

    impl ToolInvoker for StubDpkg {
        fn run(&self, program: &str, args: &[&str], _cwd: Option<&Path>) -> Result<ToolOutput> {
            assert_eq!(program, "dpkg-deb");

            let path = Path::new(args.last().expect("dpkg-deb query has a path"));
            let filename = path
                .file_name()
                .expect("deb path has a basename")
                .to_string_lossy();
            let stem = filename.trim_end_matches(".deb");
            let mut parts = stem.splitn(3, '_');
            let name = parts.next().expect("name");
            let version = parts.next().expect("version");
            let arch = parts.next().expect("arch");

            Ok(ToolOutput {
                status: 0,
                stdout: format!(
                    "Package: {}\nVersion: {}\nArchitecture: {}\n\
                     Maintainer: Test <test@example.com>\nInstalled-Size: 10\n\
                     Description: Test package {}\n",
                    name, version, arch, name
                ),
                stderr: String::new(),
            })
        }
    }

    struct Fixture {
        _storage_dir: tempfile::TempDir,
        _cache_dir: tempfile::TempDir,
        _package_dir: tempfile::TempDir,
        storage_root: PathBuf,
        package_dir: PathBuf,
        repo: DebRepository,
    }

    fn fixture() -> Fixture {
        let storage_dir = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let package_dir = tempfile::tempdir().unwrap();

        let defaults = DebDefaults {
            distribution: "focal".to_string(),
            component: "main".to_string(),
            architectures: vec!["amd64".to_string()],
            origin: "TestOrigin".to_string(),
            label: "TestLabel".to_string(),
        };

        let repo = DebRepository::new(
            Box::new(LocalBackend::new(storage_dir.path()).unwrap()),
            Box::new(StubDpkg),
            test_logger(),
            cache_dir.path().to_path_buf(),
            true,
            true,
            defaults,
        );

        Fixture {
            storage_root: storage_dir.path().to_path_buf(),
            package_dir: package_dir.path().to_path_buf(),
            _storage_dir: storage_dir,
            _cache_dir: cache_dir,
            _package_dir: package_dir,
            repo,
        }
    }

    fn write_package(fixture: &Fixture, filename: &str, content: &[u8]) -> PathBuf {
        let path = fixture.package_dir.join(filename);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn coordinate() -> DebCoordinate {
        DebCoordinate {
            distribution: "focal".to_string(),
            component: "main".to_string(),
            architecture: "amd64".to_string(),
        }
    }

    fn snapshot(fixture: &Fixture, prefix: &str) -> BTreeMap<String, Vec<u8>> {
        let root = fixture.storage_root.join(prefix);
        let mut out = BTreeMap::new();
        if !root.is_dir() {
            return out;
        }

        fn walk(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, root, out);
                } else {
                    let relative = path.strip_prefix(root).unwrap();
                    out.insert(
                        relative.to_string_lossy().to_string(),
                        std::fs::read(&path).unwrap(),
                    );
                }
            }
        }

        walk(&root, &root, &mut out);
        out
    }

    async fn live_index(fixture: &Fixture) -> PackagesIndex {
        let data = fixture
            .repo
            .storage()
            .read("dists/focal/main/binary-amd64/Packages")
            .await
            .unwrap();
        PackagesIndex::parse(&data).unwrap()
    }

    #[tokio::test]
    async fn fresh_init_creates_valid_repository() -> Result<()> {
        let fixture = fixture();
        let package = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"deb content");

        let outcome = fixture.repo.add_packages(&[package], None, None).await?;
        assert_eq!(outcome.published, vec!["myapp_1.0.0_amd64.deb"]);

        let storage = fixture.repo.storage();
        assert!(
            storage
                .exists("pool/main/m/myapp/myapp_1.0.0_amd64.deb")
                .await?
        );
        assert!(storage.exists("dists/focal/Release").await?);
        assert!(
            storage
                .exists("dists/focal/main/binary-amd64/Packages.gz")
                .await?
        );

        let index = live_index(&fixture).await;
        assert_eq!(index.len(), 1);
        let stanza = index.iter().next().unwrap();
        assert_eq!(
            stanza.field_str("Filename"),
            Some("pool/main/m/myapp/myapp_1.0.0_amd64.deb")
        );
        assert_eq!(
            stanza.field_str("SHA256"),
            Some(sha256_bytes(b"deb content").as_str())
        );

        let issues = fixture.repo.validate(&coordinate()).await?;
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);

        Ok(())
    }

    #[tokio::test]
    async fn duplicate_add_short_circuits() -> Result<()> {
        let fixture = fixture();
        let package = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"deb content");

        fixture
            .repo
            .add_packages(&[package.clone()], None, None)
            .await?;
        let before = snapshot(&fixture, "dists");

        let outcome = fixture.repo.add_packages(&[package], None, None).await?;
        assert_eq!(outcome.duplicates, vec!["myapp_1.0.0_amd64.deb"]);
        assert!(outcome.published.is_empty());

        assert_eq!(before, snapshot(&fixture, "dists"));

        Ok(())
    }

    #[tokio::test]
    async fn merge_add_keeps_existing_entries() -> Result<()> {
        let fixture = fixture();
        let first = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"first");
        fixture.repo.add_packages(&[first], None, None).await?;

        let second = write_package(&fixture, "libzstd_1.4.8_amd64.deb", b"second");
        let outcome = fixture.repo.add_packages(&[second], None, None).await?;
        assert_eq!(outcome.published, vec!["libzstd_1.4.8_amd64.deb"]);

        let index = live_index(&fixture).await;
        assert_eq!(index.len(), 2);

        // The lib prefix rule lands the package in pool/main/libz/.
        assert!(
            fixture
                .repo
                .storage()
                .exists("pool/main/libz/libzstd/libzstd_1.4.8_amd64.deb")
                .await?
        );

        let issues = fixture.repo.validate(&coordinate()).await?;
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);

        Ok(())
    }

    #[tokio::test]
    async fn update_replaces_changed_package() -> Result<()> {
        let fixture = fixture();
        let package = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"original");
        fixture.repo.add_packages(&[package], None, None).await?;

        let package = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"rebuilt");
        let outcome = fixture.repo.add_packages(&[package], None, None).await?;
        assert_eq!(outcome.updated, vec!["myapp_1.0.0_amd64.deb"]);

        let stored = fixture
            .repo
            .storage()
            .read("pool/main/m/myapp/myapp_1.0.0_amd64.deb")
            .await?;
        assert_eq!(stored, b"rebuilt");

        let index = live_index(&fixture).await;
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.iter().next().unwrap().field_str("SHA256"),
            Some(sha256_bytes(b"rebuilt").as_str())
        );

        let issues = fixture.repo.validate(&coordinate()).await?;
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);

        Ok(())
    }

    #[tokio::test]
    async fn remove_deletes_pool_object_and_stanza() -> Result<()> {
        let fixture = fixture();
        let app = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"app");
        let lib = write_package(&fixture, "libzstd_1.4.8_amd64.deb", b"lib");
        fixture.repo.add_packages(&[app, lib], None, None).await?;

        let outcome = fixture
            .repo
            .remove_packages(&["myapp".to_string()], &coordinate())
            .await?;
        assert_eq!(outcome.removed, vec!["myapp_1.0.0_amd64.deb"]);

        assert!(
            !fixture
                .repo
                .storage()
                .exists("pool/main/m/myapp/myapp_1.0.0_amd64.deb")
                .await?
        );

        let index = live_index(&fixture).await;
        assert_eq!(index.len(), 1);

        let issues = fixture.repo.validate(&coordinate()).await?;
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);

        Ok(())
    }

    #[tokio::test]
    async fn remove_by_name_version_selects_one_version() -> Result<()> {
        let fixture = fixture();
        let v1 = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"v1");
        let v2 = write_package(&fixture, "myapp_2.0.0_amd64.deb", b"v2");
        fixture.repo.add_packages(&[v1, v2], None, None).await?;

        let outcome = fixture
            .repo
            .remove_packages(&["myapp_1.0.0".to_string()], &coordinate())
            .await?;
        assert_eq!(outcome.removed, vec!["myapp_1.0.0_amd64.deb"]);

        let index = live_index(&fixture).await;
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.iter().next().unwrap().field_str("Version"),
            Some("2.0.0")
        );

        Ok(())
    }

    #[tokio::test]
    async fn remove_of_absent_package_fails() -> Result<()> {
        let fixture = fixture();
        let package = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"app");
        fixture.repo.add_packages(&[package], None, None).await?;

        let err = fixture
            .repo
            .remove_packages(&["ghost".to_string()], &coordinate())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoPublishError::NothingToRemove));

        Ok(())
    }

    #[tokio::test]
    async fn distribution_override_changes_coordinate() -> Result<()> {
        let fixture = fixture();
        let package = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"app");

        fixture
            .repo
            .add_packages(&[package], Some("jammy"), None)
            .await?;

        assert!(
            fixture
                .repo
                .storage()
                .exists("dists/jammy/main/binary-amd64/Packages")
                .await?
        );
        assert!(!fixture.repo.storage().exists("dists/focal/Release").await?);

        Ok(())
    }

    #[tokio::test]
    async fn release_lists_all_index_variants() -> Result<()> {
        let fixture = fixture();
        let package = write_package(&fixture, "myapp_1.0.0_amd64.deb", b"app");
        fixture.repo.add_packages(&[package], None, None).await?;

        let release_bytes = fixture.repo.storage().read("dists/focal/Release").await?;
        let release = ReleaseFile::parse(&release_bytes)?;

        let paths = release
            .sha256_entries
            .iter()
            .map(|entry| entry.path.as_str())
            .collect::<Vec<_>>();

        assert_eq!(
            paths,
            vec![
                "main/binary-amd64/Packages",
                "main/binary-amd64/Packages.bz2",
                "main/binary-amd64/Packages.gz",
            ]
        );
        assert_eq!(release.md5_entries.len(), 3);
        assert_eq!(release.sha1_entries.len(), 3);

        Ok(())
    }
}
