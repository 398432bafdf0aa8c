// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package inspection.

Control metadata is extracted from package files by the system tools
(`rpm -qp` for RPM, `dpkg-deb -f` for Debian) rather than by parsing the
container formats here. The inspectors also compute the streaming digests a
package needs for dedup and index entries, and derive the repository
coordinate the package publishes into.
*/

use {
    crate::{
        debian::control::{ControlFileParser, ControlParagraph},
        error::{RepoPublishError, Result},
        io::{multi_digest_path, sha256_path, MultiContentDigest},
        tools::{run_checked, ToolInvoker},
    },
    std::path::{Path, PathBuf},
};

/// Identifies one RPM repository instance within a backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RpmCoordinate {
    pub el_version: String,
    pub arch: String,
}

impl RpmCoordinate {
    /// The storage prefix of the repository, e.g. `el9/x86_64`.
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.el_version, self.arch)
    }

    /// Infer the coordinate from a package filename like
    /// `hello-world-1.0.0-1.el9.x86_64.rpm`, for operations that receive
    /// only filenames.
    pub fn infer_from_filename(filename: &str) -> Result<Self> {
        let stem = filename.strip_suffix(".rpm").ok_or_else(|| {
            RepoPublishError::MalformedPackage(
                filename.to_string(),
                "not an .rpm filename".to_string(),
            )
        })?;

        let arch = stem.rsplit('.').next().filter(|a| !a.is_empty()).ok_or_else(|| {
            RepoPublishError::MalformedPackage(
                filename.to_string(),
                "could not detect architecture from filename".to_string(),
            )
        })?;

        let el_version = el_version_from_release(stem).ok_or_else(|| {
            RepoPublishError::MalformedPackage(
                filename.to_string(),
                "could not detect EL version from filename".to_string(),
            )
        })?;

        Ok(Self {
            el_version,
            arch: arch.to_string(),
        })
    }
}

impl std::fmt::Display for RpmCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.el_version, self.arch)
    }
}

/// Identifies one Debian repository index within a backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DebCoordinate {
    pub distribution: String,
    pub component: String,
    pub architecture: String,
}

impl DebCoordinate {
    /// The storage prefix of the distribution, e.g. `dists/focal`.
    pub fn dists_path(&self) -> String {
        format!("dists/{}", self.distribution)
    }

    /// The storage prefix of the binary index directory,
    /// e.g. `dists/focal/main/binary-amd64`.
    pub fn index_path(&self) -> String {
        format!(
            "dists/{}/{}/binary-{}",
            self.distribution, self.component, self.architecture
        )
    }

    /// The index directory relative to `dists/<codename>/`.
    pub fn relative_index_dir(&self) -> String {
        format!("{}/binary-{}", self.component, self.architecture)
    }
}

impl std::fmt::Display for DebCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.distribution, self.component, self.architecture
        )
    }
}

/// An inspected RPM package file.
#[derive(Clone, Debug)]
pub struct RpmPackage {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: String,
    pub arch: String,
    pub el_version: String,
    pub sha256: String,
    pub size: u64,
    pub local_path: PathBuf,
}

impl RpmPackage {
    /// Inspect a local `.rpm` file.
    pub fn inspect(invoker: &dyn ToolInvoker, path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy();
        let output = run_checked(
            invoker,
            "rpm",
            &[
                "-qp",
                "--queryformat",
                "%{NAME}\\t%{VERSION}\\t%{RELEASE}\\t%{EPOCH}\\t%{ARCH}",
                &path_str,
            ],
            None,
        )
        .map_err(|e| malformed(path, format!("rpm query failed: {}", e)))?;

        let fields = output.stdout.trim().split('\t').collect::<Vec<_>>();
        if fields.len() != 5 {
            return Err(malformed(
                path,
                format!("unexpected rpm query output: {:?}", output.stdout),
            ));
        }

        let (name, version, release, epoch, arch) =
            (fields[0], fields[1], fields[2], fields[3], fields[4]);

        for (label, value) in [("name", name), ("version", version), ("release", release)] {
            if value.is_empty() || value == "(none)" {
                return Err(malformed(path, format!("missing {} field", label)));
            }
        }

        if arch.is_empty() || arch == "(none)" {
            return Err(malformed(path, "missing architecture field".to_string()));
        }

        let el_version = el_version_from_release(release).ok_or_else(|| {
            malformed(
                path,
                format!("could not determine EL version from release: {}", release),
            )
        })?;

        let epoch = if epoch == "(none)" { "0" } else { epoch };

        let size = std::fs::metadata(path)?.len();
        let sha256 = sha256_path(path)?;

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            epoch: epoch.to_string(),
            arch: arch.to_string(),
            el_version,
            sha256,
            size,
            local_path: path.to_path_buf(),
        })
    }

    /// The basename the package publishes under.
    pub fn filename(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// The repository coordinate this package publishes into.
    pub fn coordinate(&self) -> RpmCoordinate {
        RpmCoordinate {
            el_version: self.el_version.clone(),
            arch: self.arch.clone(),
        }
    }
}

/// Derive the EL version tag (`el9`) from an RPM release string (`1.el9`).
pub fn el_version_from_release(release: &str) -> Option<String> {
    release
        .split('.')
        .find(|segment| {
            segment.len() > 2
                && segment.starts_with("el")
                && segment[2..].chars().all(|c| c.is_ascii_digit())
        })
        .map(String::from)
}

/// An inspected Debian package file.
#[derive(Clone, Debug)]
pub struct DebPackage {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub control: ControlParagraph<'static>,
    pub digests: MultiContentDigest,
    pub size: u64,
    pub local_path: PathBuf,
    /// Custom `Distribution` control field, if the package carries one.
    pub distribution: Option<String>,
    /// Custom `Component` control field, if the package carries one.
    pub component: Option<String>,
}

impl DebPackage {
    /// Inspect a local `.deb` file.
    pub fn inspect(invoker: &dyn ToolInvoker, path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy();
        let output = run_checked(invoker, "dpkg-deb", &["-f", &path_str], None)
            .map_err(|e| malformed(path, format!("dpkg-deb query failed: {}", e)))?;

        let mut parser = ControlFileParser::default();
        let mut control = None;

        for line in output.stdout.lines() {
            if let Some(paragraph) = parser
                .write_line(line)
                .map_err(|e| malformed(path, format!("control parse error: {}", e)))?
            {
                control = Some(paragraph);
                break;
            }
        }

        let control = match control {
            Some(paragraph) => paragraph,
            None => parser
                .finish()
                .map_err(|e| malformed(path, format!("control parse error: {}", e)))?
                .ok_or_else(|| malformed(path, "empty control output".to_string()))?,
        };

        let name = control
            .field_str("Package")
            .ok_or_else(|| malformed(path, "missing Package field".to_string()))?
            .to_string();
        let version = control
            .field_str("Version")
            .ok_or_else(|| malformed(path, "missing Version field".to_string()))?
            .to_string();
        let architecture = control
            .field_str("Architecture")
            .ok_or_else(|| malformed(path, "missing Architecture field".to_string()))?
            .to_string();

        let distribution = control.field_str("Distribution").map(String::from);
        let component = control.field_str("Component").map(String::from);

        let size = std::fs::metadata(path)?.len();
        let digests = multi_digest_path(path)?;

        Ok(Self {
            name,
            version,
            architecture,
            control,
            digests,
            size,
            local_path: path.to_path_buf(),
            distribution,
            component,
        })
    }

    /// The basename the package publishes under.
    pub fn filename(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// The canonical pool path for this package within a component.
    ///
    /// `pool/<component>/<prefix>/<name>/<filename>` where `<prefix>` is the
    /// first letter of the package name, except for `lib` packages, which use
    /// `lib` plus the fourth character.
    pub fn pool_path(&self, component: &str) -> String {
        pool_path(component, &self.name, &self.filename())
    }
}

/// Compute a Debian pool path for a package name and filename.
pub fn pool_path(component: &str, package: &str, filename: &str) -> String {
    let prefix = if package.starts_with("lib") {
        if package.len() > 3 {
            format!("lib{}", &package[3..4])
        } else {
            "lib".to_string()
        }
    } else {
        package[0..1].to_lowercase()
    };

    format!("pool/{}/{}/{}/{}", component, prefix, package, filename)
}

fn malformed(path: &Path, detail: String) -> RepoPublishError {
    RepoPublishError::MalformedPackage(path.to_string_lossy().to_string(), detail)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn el_version_derivation() {
        assert_eq!(el_version_from_release("1.el9"), Some("el9".to_string()));
        assert_eq!(
            el_version_from_release("4.el10.1"),
            Some("el10".to_string())
        );
        assert_eq!(el_version_from_release("1.fc38"), None);
        assert_eq!(el_version_from_release("elastic.1"), None);
    }

    #[test]
    fn coordinate_inference_from_filename() {
        let coordinate =
            RpmCoordinate::infer_from_filename("hello-world-1.0.0-1.el9.x86_64.rpm").unwrap();
        assert_eq!(coordinate.el_version, "el9");
        assert_eq!(coordinate.arch, "x86_64");

        assert!(RpmCoordinate::infer_from_filename("not-a-package.deb").is_err());
        assert!(RpmCoordinate::infer_from_filename("no-el-tag-1.0-1.fc38.x86_64.rpm").is_err());
    }

    #[test]
    fn pool_path_prefix_rules() {
        assert_eq!(
            pool_path("main", "myapp", "myapp_1.0.0_amd64.deb"),
            "pool/main/m/myapp/myapp_1.0.0_amd64.deb"
        );
        assert_eq!(
            pool_path("main", "libzstd", "libzstd_1.4.8_amd64.deb"),
            "pool/main/libz/libzstd/libzstd_1.4.8_amd64.deb"
        );
        assert_eq!(
            pool_path("contrib", "lib", "lib_1_amd64.deb"),
            "pool/contrib/lib/lib/lib_1_amd64.deb"
        );
    }

    struct StubRpm;

    impl ToolInvoker for StubRpm {
        fn run(
            &self,
            program: &str,
            _args: &[&str],
            _cwd: Option<&Path>,
        ) -> Result<crate::tools::ToolOutput> {
            assert_eq!(program, "rpm");
            Ok(crate::tools::ToolOutput {
                status: 0,
                stdout: "hello-world\t1.0.0\t1.el9\t(none)\tx86_64".to_string(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn rpm_inspection_via_stub() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hello-world-1.0.0-1.el9.x86_64.rpm");
        std::fs::write(&path, b"fake rpm payload")?;

        let package = RpmPackage::inspect(&StubRpm, &path)?;

        assert_eq!(package.name, "hello-world");
        assert_eq!(package.version, "1.0.0");
        assert_eq!(package.release, "1.el9");
        assert_eq!(package.epoch, "0");
        assert_eq!(package.arch, "x86_64");
        assert_eq!(package.el_version, "el9");
        assert_eq!(package.coordinate().repo_path(), "el9/x86_64");
        assert_eq!(package.size, 16);
        assert_eq!(package.sha256, crate::io::sha256_bytes(b"fake rpm payload"));

        Ok(())
    }

    struct StubDpkg;

    impl ToolInvoker for StubDpkg {
        fn run(
            &self,
            program: &str,
            _args: &[&str],
            _cwd: Option<&Path>,
        ) -> Result<crate::tools::ToolOutput> {
            assert_eq!(program, "dpkg-deb");
            Ok(crate::tools::ToolOutput {
                status: 0,
                stdout: "Package: myapp\nVersion: 1.0.0\nArchitecture: amd64\n\
                         Maintainer: Someone <someone@example.com>\nDescription: An app\n"
                    .to_string(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn deb_inspection_via_stub() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("myapp_1.0.0_amd64.deb");
        std::fs::write(&path, b"fake deb payload")?;

        let package = DebPackage::inspect(&StubDpkg, &path)?;

        assert_eq!(package.name, "myapp");
        assert_eq!(package.version, "1.0.0");
        assert_eq!(package.architecture, "amd64");
        assert!(package.distribution.is_none());
        assert_eq!(
            package.pool_path("main"),
            "pool/main/m/myapp/myapp_1.0.0_amd64.deb"
        );

        Ok(())
    }
}
