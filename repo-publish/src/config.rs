// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration handling.

Configuration is a flat mapping from dot-notated string keys to primitive
values, serialized as JSON. Example:

```json
{
    "backend.type": "s3",
    "backend.s3.bucket": "my-bucket",
    "repo.cache_dir": "/var/cache/rpmrepo"
}
```

Keys may carry a per-family segment (`backend.rpm.*` / `backend.deb.*`,
`repo.rpm.cache_dir` / `repo.deb.cache_dir`); lookups consult the
family-specific key before the shared key. Legacy flat keys from earlier
releases are migrated to the dot-key form when a file is loaded.
*/

use {
    crate::error::{RepoPublishError, Result},
    serde_json::Value,
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

/// Repository family a configuration lookup applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Family {
    Rpm,
    Debian,
}

impl Family {
    /// The key segment used for family-specific overrides.
    pub fn key_segment(&self) -> &'static str {
        match self {
            Self::Rpm => "rpm",
            Self::Debian => "deb",
        }
    }

    /// The tool name, which doubles as the config file basename.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Rpm => "rpmrepo",
            Self::Debian => "debrepo",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rpm => write!(f, "rpm"),
            Self::Debian => write!(f, "debian"),
        }
    }
}

/// Mapping of legacy flat keys to their dot-notated replacements.
const LEGACY_KEY_MAP: &[(&str, &str)] = &[
    ("storage_type", "backend.type"),
    ("s3_bucket", "backend.s3.bucket"),
    ("aws_profile", "backend.s3.profile"),
    ("s3_endpoint_url", "backend.s3.endpoint"),
    ("local_storage_path", "backend.local.path"),
    ("local_repo_base", "repo.cache_dir"),
];

/// Where a config file lives, for the `config` subcommand's scope flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigScope {
    /// `./<tool>.conf`
    Local,
    /// `~/.<tool>.conf`
    Global,
    /// `/etc/<tool>.conf`
    System,
}

impl ConfigScope {
    pub fn path(&self, tool: &str) -> PathBuf {
        match self {
            Self::Local => PathBuf::from(format!("./{}.conf", tool)),
            Self::Global => home_dir().join(format!(".{}.conf", tool)),
            Self::System => PathBuf::from(format!("/etc/{}.conf", tool)),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Git-style configuration manager with dot notation.
#[derive(Clone, Debug)]
pub struct RepoConfig {
    config_file: PathBuf,
    data: BTreeMap<String, Value>,
}

impl RepoConfig {
    /// Default values consulted when neither a family-specific nor a shared
    /// key is present.
    fn defaults() -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("backend.type".to_string(), Value::from("s3")),
            ("validation.enabled".to_string(), Value::from(true)),
            ("behavior.confirm".to_string(), Value::from(true)),
            ("behavior.backup".to_string(), Value::from(true)),
        ])
    }

    /// Load configuration for a tool, searching the standard locations.
    ///
    /// Search order: explicit path, `./<tool>.conf`, `~/.<tool>.conf`,
    /// `/etc/<tool>.conf`. A missing file is not an error; defaults apply.
    pub fn load(tool: &str, explicit_path: Option<&Path>) -> Result<Self> {
        let config_file = match explicit_path {
            Some(p) => p.to_path_buf(),
            None => Self::find_config_file(tool),
        };

        let mut config = Self {
            config_file,
            data: BTreeMap::new(),
        };

        if config.config_file.exists() {
            let content = std::fs::read_to_string(&config.config_file)?;
            let parsed: BTreeMap<String, Value> = serde_json::from_str(&content)?;
            config.data = parsed;

            if config.needs_migration() {
                config.migrate_legacy_keys();
                config.save(None)?;
            }
        }

        Ok(config)
    }

    /// Construct an empty configuration bound to a specific file path.
    pub fn empty(config_file: impl AsRef<Path>) -> Self {
        Self {
            config_file: config_file.as_ref().to_path_buf(),
            data: BTreeMap::new(),
        }
    }

    fn find_config_file(tool: &str) -> PathBuf {
        let candidates = [
            ConfigScope::Local.path(tool),
            ConfigScope::Global.path(tool),
            ConfigScope::System.path(tool),
        ];

        for candidate in &candidates {
            if candidate.exists() {
                return candidate.clone();
            }
        }

        ConfigScope::Global.path(tool)
    }

    /// The file this configuration was loaded from / will be saved to.
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Get a config value by dot-notated key, falling back to defaults.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.data.get(key) {
            return Some(v.clone());
        }

        Self::defaults().get(key).cloned()
    }

    /// Get a value consulting the family-specific key before the shared key.
    ///
    /// `get_for_family(Family::Rpm, "backend.type")` consults
    /// `backend.rpm.type`, then `backend.type`, then the defaults.
    pub fn get_for_family(&self, family: Family, key: &str) -> Option<Value> {
        if let Some(v) = self.data.get(&family_key(family, key)) {
            return Some(v.clone());
        }

        self.get(key)
    }

    /// Get a string value.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    /// Get a string value with family-specific override.
    pub fn get_str_for_family(&self, family: Family, key: &str) -> Option<String> {
        self.get_for_family(family, key)
            .and_then(|v| v.as_str().map(String::from))
    }

    /// Get a boolean value, with a fallback default.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Set a value. Accepts strings, booleans, and integers.
    pub fn set(&mut self, key: impl ToString, value: Value) -> Result<()> {
        if !matches!(
            value,
            Value::String(_) | Value::Bool(_) | Value::Number(_)
        ) {
            return Err(RepoPublishError::Config(format!(
                "config values must be strings, booleans, or integers; got {}",
                value
            )));
        }

        self.data.insert(key.to_string(), value);

        Ok(())
    }

    /// Set a value from a CLI-supplied string, coercing `true`/`false` and
    /// integers into their typed forms.
    pub fn set_from_str(&mut self, key: impl ToString, value: &str) -> Result<()> {
        let value = match value {
            "true" => Value::from(true),
            "false" => Value::from(false),
            other => match other.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::from(other),
            },
        };

        self.set(key, value)
    }

    /// Remove a key. Returns whether the key was present.
    pub fn unset(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// All effective key-value pairs: defaults overlaid with explicit values.
    pub fn list_all(&self) -> BTreeMap<String, Value> {
        let mut all = Self::defaults();
        all.extend(self.data.clone());

        all
    }

    /// Validate the configuration, returning human-readable error strings.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        let backend_type = self.get_str("backend.type").unwrap_or_default();
        match backend_type.as_str() {
            "s3" => {
                if self.get_str("backend.s3.bucket").is_none()
                    && self.get_str("backend.rpm.s3.bucket").is_none()
                    && self.get_str("backend.deb.s3.bucket").is_none()
                {
                    errors.push("backend.s3.bucket is required for the s3 backend".to_string());
                }
            }
            "local" => {
                if self.get_str("backend.local.path").is_none()
                    && self.get_str("backend.rpm.local.path").is_none()
                    && self.get_str("backend.deb.local.path").is_none()
                {
                    errors.push("backend.local.path is required for the local backend".to_string());
                }
            }
            other => {
                errors.push(format!(
                    "invalid backend.type: '{}' (must be 's3' or 'local')",
                    other
                ));
            }
        }

        errors
    }

    /// Persist the configuration as sorted, indented JSON.
    pub fn save(&self, target: Option<&Path>) -> Result<()> {
        let target = target.unwrap_or(&self.config_file);

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(target, content)?;

        Ok(())
    }

    /// The local staging root for a family.
    pub fn cache_dir(&self, family: Family) -> PathBuf {
        let configured = self
            .get_str(&family_key(family, "repo.cache_dir"))
            .or_else(|| self.get_str("repo.cache_dir"));

        match configured {
            Some(path) => expand_user(&path),
            None => home_dir().join(format!(".cache/{}", family.tool_name())),
        }
    }

    fn needs_migration(&self) -> bool {
        LEGACY_KEY_MAP
            .iter()
            .any(|(legacy, _)| self.data.contains_key(*legacy))
    }

    fn migrate_legacy_keys(&mut self) {
        let mut migrated = BTreeMap::new();

        for (legacy, new_key) in LEGACY_KEY_MAP {
            if let Some(value) = self.data.remove(*legacy) {
                migrated.insert(new_key.to_string(), value);
            }
        }

        // Keys already in dot notation are kept; anything else flat and
        // unknown is dropped rather than carried forward indefinitely.
        for (key, value) in std::mem::take(&mut self.data) {
            if key.contains('.') {
                migrated.entry(key).or_insert(value);
            }
        }

        self.data = migrated;
    }
}

/// Insert the family segment after the first key component.
///
/// `backend.type` becomes `backend.rpm.type`; `repo.cache_dir` becomes
/// `repo.rpm.cache_dir`.
pub fn family_key(family: Family, key: &str) -> String {
    match key.split_once('.') {
        Some((head, rest)) => format!("{}.{}.{}", head, family.key_segment(), rest),
        None => format!("{}.{}", family.key_segment(), key),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else if path == "~" {
        home_dir()
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_apply() {
        let config = RepoConfig::empty("/nonexistent/test.conf");

        assert_eq!(config.get_str("backend.type").unwrap(), "s3");
        assert!(config.get_bool("validation.enabled", true));
        assert!(config.get_bool("behavior.confirm", true));
        assert!(config.get_bool("behavior.backup", true));
    }

    #[test]
    fn family_key_insertion() {
        assert_eq!(family_key(Family::Rpm, "backend.type"), "backend.rpm.type");
        assert_eq!(
            family_key(Family::Debian, "repo.cache_dir"),
            "repo.deb.cache_dir"
        );
    }

    #[test]
    fn family_lookup_prefers_specific_key() -> crate::error::Result<()> {
        let mut config = RepoConfig::empty("/nonexistent/test.conf");
        config.set("backend.type", Value::from("s3"))?;
        config.set("backend.rpm.type", Value::from("local"))?;

        assert_eq!(
            config
                .get_for_family(Family::Rpm, "backend.type")
                .unwrap()
                .as_str()
                .unwrap(),
            "local"
        );
        assert_eq!(
            config
                .get_for_family(Family::Debian, "backend.type")
                .unwrap()
                .as_str()
                .unwrap(),
            "s3"
        );

        Ok(())
    }

    #[test]
    fn legacy_keys_migrate_on_load() -> crate::error::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rpmrepo.conf");
        std::fs::write(
            &path,
            r#"{"storage_type": "local", "local_storage_path": "/srv/repo", "s3_bucket": "b"}"#,
        )?;

        let config = RepoConfig::load("rpmrepo", Some(&path))?;

        assert_eq!(config.get_str("backend.type").unwrap(), "local");
        assert_eq!(config.get_str("backend.local.path").unwrap(), "/srv/repo");
        assert_eq!(config.get_str("backend.s3.bucket").unwrap(), "b");

        // The migrated form was written back.
        let rewritten = std::fs::read_to_string(&path)?;
        assert!(rewritten.contains("backend.type"));
        assert!(!rewritten.contains("storage_type"));

        Ok(())
    }

    #[test]
    fn rejects_structured_values() {
        let mut config = RepoConfig::empty("/nonexistent/test.conf");
        assert!(config
            .set("backend.type", serde_json::json!({"nested": true}))
            .is_err());
    }

    #[test]
    fn set_from_str_coerces_types() -> crate::error::Result<()> {
        let mut config = RepoConfig::empty("/nonexistent/test.conf");
        config.set_from_str("validation.enabled", "false")?;
        config.set_from_str("some.count", "42")?;
        config.set_from_str("backend.s3.bucket", "my-bucket")?;

        assert!(!config.get_bool("validation.enabled", true));
        assert_eq!(config.get("some.count").unwrap(), Value::from(42));
        assert_eq!(config.get_str("backend.s3.bucket").unwrap(), "my-bucket");

        Ok(())
    }

    #[test]
    fn validate_reports_missing_bucket() {
        let config = RepoConfig::empty("/nonexistent/test.conf");
        let errors = config.validate();

        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("backend.s3.bucket"));
    }

    #[test]
    fn validate_accepts_local_backend() -> crate::error::Result<()> {
        let mut config = RepoConfig::empty("/nonexistent/test.conf");
        config.set("backend.type", Value::from("local"))?;
        config.set("backend.local.path", Value::from("/srv/repo"))?;

        assert!(config.validate().is_empty());

        Ok(())
    }
}
