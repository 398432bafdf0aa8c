// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{App, AppSettings, Arg, ArgMatches, SubCommand},
    repo_publish::{
        config::{ConfigScope, Family, RepoConfig},
        debian::engine::DebRepository,
        error::RepoPublishError,
        inspect::{DebCoordinate, RpmCoordinate},
        rpm::engine::RpmRepository,
        validation::ValidationIssue,
    },
    slog::{o, Drain},
    std::path::{Path, PathBuf},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Publish(#[from] RepoPublishError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("repository failed validation with {0} issue(s)")]
    ValidationFailed(usize),

    #[error("configuration is invalid")]
    ConfigInvalid,

    #[error("config key not found: {0}")]
    ConfigKeyNotFound(String),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Construct the terminal logger the engines report through.
fn get_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build();
    let drain = std::sync::Mutex::new(drain).fuse();

    slog::Logger::root(drain, o!())
}

/// Run the CLI for one repository family. Returns `Ok(())` on success;
/// any error maps to exit code 1.
pub async fn run_cli(family: Family) -> Result<()> {
    let tool = family.tool_name();

    let app = App::new(tool)
        .setting(AppSettings::ArgRequiredElseHelp)
        .version("0.4")
        .about(match family {
            Family::Rpm => "Manage RPM repositories in pluggable storage",
            Family::Debian => "Manage Debian repositories in pluggable storage",
        })
        .arg(
            Arg::with_name("config")
                .long("--config")
                .takes_value(true)
                .global(true)
                .help("Path to config file"),
        )
        .arg(
            Arg::with_name("bucket")
                .short("b")
                .long("--bucket")
                .takes_value(true)
                .global(true)
                .help("S3 bucket name (overrides config file)"),
        )
        .arg(
            Arg::with_name("cache-dir")
                .short("d")
                .long("--cache-dir")
                .takes_value(true)
                .global(true)
                .help("Custom cache directory (overrides config file)"),
        )
        .arg(
            Arg::with_name("profile")
                .long("--profile")
                .takes_value(true)
                .global(true)
                .help("Credential profile (overrides config file and environment)"),
        )
        .arg(
            Arg::with_name("s3-endpoint-url")
                .long("--s3-endpoint-url")
                .takes_value(true)
                .global(true)
                .help("Custom S3 endpoint URL for S3-compatible services"),
        );

    let add = SubCommand::with_name("add")
        .about("Add packages to a repository")
        .arg(
            Arg::with_name("packages")
                .multiple(true)
                .required(true)
                .help("Package file(s) to add"),
        )
        .arg(
            Arg::with_name("yes")
                .short("y")
                .long("--yes")
                .help("Skip the confirmation prompt"),
        )
        .arg(
            Arg::with_name("no-validate")
                .long("--no-validate")
                .help("Skip post-operation validation"),
        );

    let add = match family {
        Family::Debian => add
            .arg(
                Arg::with_name("distribution")
                    .long("--distribution")
                    .takes_value(true)
                    .help("Override distribution detection"),
            )
            .arg(
                Arg::with_name("component")
                    .long("--component")
                    .takes_value(true)
                    .help("Override component detection"),
            ),
        Family::Rpm => add,
    };

    let remove = SubCommand::with_name("remove")
        .about("Remove packages from a repository")
        .arg(
            Arg::with_name("packages")
                .multiple(true)
                .required(true)
                .help("Package name(s) to remove"),
        )
        .arg(
            Arg::with_name("yes")
                .short("y")
                .long("--yes")
                .help("Skip the confirmation prompt"),
        )
        .arg(
            Arg::with_name("no-validate")
                .long("--no-validate")
                .help("Skip post-operation validation"),
        );

    let remove = match family {
        Family::Rpm => remove
            .arg(
                Arg::with_name("el-version")
                    .long("--el-version")
                    .takes_value(true)
                    .help("EL version (e.g. el9); detected from the filename if omitted"),
            )
            .arg(
                Arg::with_name("arch")
                    .long("--arch")
                    .takes_value(true)
                    .help("Architecture (e.g. x86_64); detected from the filename if omitted"),
            ),
        Family::Debian => remove
            .arg(
                Arg::with_name("distribution")
                    .long("--distribution")
                    .takes_value(true)
                    .help("Distribution name"),
            )
            .arg(
                Arg::with_name("component")
                    .long("--component")
                    .takes_value(true)
                    .help("Component name"),
            )
            .arg(
                Arg::with_name("architecture")
                    .long("--architecture")
                    .takes_value(true)
                    .help("Architecture"),
            ),
    };

    let validate = match family {
        Family::Rpm => SubCommand::with_name("validate")
            .about("Run full validation against a repository")
            .arg(Arg::with_name("el_version").required(true).help("EL version (e.g. el9)"))
            .arg(Arg::with_name("arch").required(true).help("Architecture (e.g. x86_64)")),
        Family::Debian => SubCommand::with_name("validate")
            .about("Run full validation against a repository")
            .arg(
                Arg::with_name("distribution")
                    .required(true)
                    .help("Distribution name (e.g. focal)"),
            )
            .arg(
                Arg::with_name("component")
                    .required(true)
                    .help("Component name (e.g. main)"),
            )
            .arg(
                Arg::with_name("architecture")
                    .required(true)
                    .help("Architecture (e.g. amd64)"),
            ),
    };

    let config_cmd = SubCommand::with_name("config")
        .about("Manage configuration")
        .arg(Arg::with_name("key").help("Config key (dot notation)"))
        .arg(Arg::with_name("value").help("Config value (if setting)"))
        .arg(Arg::with_name("list").long("--list").help("List all config values"))
        .arg(
            Arg::with_name("unset")
                .long("--unset")
                .takes_value(true)
                .value_name("KEY")
                .help("Remove a config key"),
        )
        .arg(
            Arg::with_name("validate")
                .long("--validate")
                .help("Validate configuration"),
        )
        .arg(
            Arg::with_name("file")
                .long("--file")
                .takes_value(true)
                .help("Use a specific config file"),
        )
        .arg(
            Arg::with_name("global")
                .long("--global")
                .help("Use the global config (~/.<tool>.conf)"),
        )
        .arg(
            Arg::with_name("local")
                .long("--local")
                .help("Use the local config (./<tool>.conf)"),
        )
        .arg(
            Arg::with_name("system")
                .long("--system")
                .help("Use the system config (/etc/<tool>.conf)"),
        );

    let matches = app
        .subcommand(add)
        .subcommand(remove)
        .subcommand(validate)
        .subcommand(config_cmd)
        .get_matches();

    match matches.subcommand() {
        ("config", Some(args)) => command_config(family, args),
        ("add", Some(args)) => command_add(family, &matches, args).await,
        ("remove", Some(args)) => command_remove(family, &matches, args).await,
        ("validate", Some(args)) => command_validate(family, &matches, args).await,
        (command, _) => Err(CliError::InvalidSubCommand(command.to_string())),
    }
}

/// Load configuration and apply global flag overrides.
///
/// Global flags propagate into subcommand matches, so the subcommand's
/// matches are consulted first.
fn load_config(family: Family, matches: &ArgMatches<'_>, args: &ArgMatches<'_>) -> Result<RepoConfig> {
    let flag = |name: &str| args.value_of(name).or_else(|| matches.value_of(name));

    let explicit = flag("config").map(Path::new);
    let mut config = RepoConfig::load(family.tool_name(), explicit)?;

    if let Some(bucket) = flag("bucket") {
        config.set_from_str("backend.s3.bucket", bucket)?;
    }
    if let Some(cache_dir) = flag("cache-dir") {
        config.set_from_str("repo.cache_dir", cache_dir)?;
    }
    if let Some(endpoint) = flag("s3-endpoint-url") {
        config.set_from_str("backend.s3.endpoint", endpoint)?;
    }
    if let Some(profile) = flag("profile") {
        config.set_from_str("backend.s3.profile", profile)?;
    }
    if args.is_present("no-validate") {
        config.set_from_str("validation.enabled", "false")?;
    }

    Ok(config)
}

/// Print the pre-flight summary and ask for confirmation.
fn confirm_operation(
    config: &RepoConfig,
    backend_info: &[(String, String)],
    action: &str,
    items: &[String],
    skip_prompt: bool,
) -> Result<bool> {
    println!();
    println!("Configuration:");
    for (label, value) in backend_info {
        println!("  {:<12}: {}", label, value);
    }
    println!("  {:<12}: {}", "Action", action);
    println!("  {:<12}: {}", "Packages", items.len());
    for item in items {
        println!("    - {}", item);
    }
    println!();

    if skip_prompt || !config.get_bool("behavior.confirm", true) {
        return Ok(true);
    }

    print!("Continue? (yes/no): ");
    use std::io::Write;
    std::io::stdout().flush()?;

    let mut response = String::new();
    std::io::stdin().read_line(&mut response)?;

    if response.trim().eq_ignore_ascii_case("yes") {
        Ok(true)
    } else {
        println!("Cancelled");
        Ok(false)
    }
}

async fn command_add(
    family: Family,
    matches: &ArgMatches<'_>,
    args: &ArgMatches<'_>,
) -> Result<()> {
    let config = load_config(family, matches, args)?;
    let logger = get_logger();

    let files = args
        .values_of("packages")
        .expect("packages argument is required")
        .map(PathBuf::from)
        .collect::<Vec<_>>();
    let names = files
        .iter()
        .map(|f| {
            f.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| f.to_string_lossy().to_string())
        })
        .collect::<Vec<_>>();

    match family {
        Family::Rpm => {
            let repo = RpmRepository::from_config(&config, logger)?;

            if !confirm_operation(
                &config,
                &repo.storage().describe(),
                "ADD",
                &names,
                args.is_present("yes"),
            )? {
                return Ok(());
            }

            let outcome = repo.add_packages(&files).await?;
            print_add_outcome(&outcome);
        }
        Family::Debian => {
            let repo = DebRepository::from_config(&config, logger)?;

            if !confirm_operation(
                &config,
                &repo.storage().describe(),
                "ADD",
                &names,
                args.is_present("yes"),
            )? {
                return Ok(());
            }

            let outcome = repo
                .add_packages(
                    &files,
                    args.value_of("distribution"),
                    args.value_of("component"),
                )
                .await?;
            print_add_outcome(&outcome);
        }
    }

    Ok(())
}

async fn command_remove(
    family: Family,
    matches: &ArgMatches<'_>,
    args: &ArgMatches<'_>,
) -> Result<()> {
    let config = load_config(family, matches, args)?;
    let logger = get_logger();

    let names = args
        .values_of("packages")
        .expect("packages argument is required")
        .map(String::from)
        .collect::<Vec<_>>();

    match family {
        Family::Rpm => {
            let repo = RpmRepository::from_config(&config, logger)?;

            let coordinate = match (args.value_of("el-version"), args.value_of("arch")) {
                (Some(el_version), Some(arch)) => RpmCoordinate {
                    el_version: el_version.to_string(),
                    arch: arch.to_string(),
                },
                _ => RpmCoordinate::infer_from_filename(&names[0])?,
            };

            if !confirm_operation(
                &config,
                &repo.storage().describe(),
                "REMOVE",
                &names,
                args.is_present("yes"),
            )? {
                return Ok(());
            }

            let outcome = repo.remove_packages(&names, &coordinate).await?;
            print_remove_outcome(&outcome);
        }
        Family::Debian => {
            let repo = DebRepository::from_config(&config, logger)?;

            let defaults = repo.defaults().clone();
            let coordinate = DebCoordinate {
                distribution: args
                    .value_of("distribution")
                    .map(String::from)
                    .unwrap_or(defaults.distribution),
                component: args
                    .value_of("component")
                    .map(String::from)
                    .unwrap_or(defaults.component),
                architecture: args
                    .value_of("architecture")
                    .map(String::from)
                    .unwrap_or_else(|| {
                        defaults
                            .architectures
                            .first()
                            .cloned()
                            .unwrap_or_else(|| "amd64".to_string())
                    }),
            };

            if !confirm_operation(
                &config,
                &repo.storage().describe(),
                "REMOVE",
                &names,
                args.is_present("yes"),
            )? {
                return Ok(());
            }

            let outcome = repo.remove_packages(&names, &coordinate).await?;
            print_remove_outcome(&outcome);
        }
    }

    Ok(())
}

async fn command_validate(
    family: Family,
    matches: &ArgMatches<'_>,
    args: &ArgMatches<'_>,
) -> Result<()> {
    let config = load_config(family, matches, args)?;
    let logger = get_logger();

    let issues = match family {
        Family::Rpm => {
            let repo = RpmRepository::from_config(&config, logger)?;
            let coordinate = RpmCoordinate {
                el_version: args.value_of("el_version").expect("required").to_string(),
                arch: args.value_of("arch").expect("required").to_string(),
            };

            repo.validate(&coordinate).await?
        }
        Family::Debian => {
            let repo = DebRepository::from_config(&config, logger)?;
            let coordinate = DebCoordinate {
                distribution: args.value_of("distribution").expect("required").to_string(),
                component: args.value_of("component").expect("required").to_string(),
                architecture: args.value_of("architecture").expect("required").to_string(),
            };

            repo.validate(&coordinate).await?
        }
    };

    print_issues(&issues);

    if issues.is_empty() {
        Ok(())
    } else {
        Err(CliError::ValidationFailed(issues.len()))
    }
}

fn command_config(family: Family, args: &ArgMatches<'_>) -> Result<()> {
    let tool = family.tool_name();

    let explicit_path = if let Some(path) = args.value_of("file") {
        Some(PathBuf::from(path))
    } else if args.is_present("global") {
        Some(ConfigScope::Global.path(tool))
    } else if args.is_present("local") {
        Some(ConfigScope::Local.path(tool))
    } else if args.is_present("system") {
        Some(ConfigScope::System.path(tool))
    } else {
        None
    };

    let mut config = RepoConfig::load(tool, explicit_path.as_deref())?;

    if args.is_present("validate") {
        let errors = config.validate();
        if errors.is_empty() {
            println!("Configuration is valid");
            return Ok(());
        }

        for error in &errors {
            eprintln!("error: {}", error);
        }
        return Err(CliError::ConfigInvalid);
    }

    if let Some(key) = args.value_of("unset") {
        if config.unset(key) {
            config.save(None)?;
            println!("Removed {}", key);
            return Ok(());
        }

        return Err(CliError::ConfigKeyNotFound(key.to_string()));
    }

    match (args.value_of("key"), args.value_of("value")) {
        (Some(key), Some(value)) => {
            config.set_from_str(key, value)?;
            config.save(None)?;
            println!("{} = {}", key, value);
        }
        (Some(key), None) => match config.get(key) {
            Some(value) => println!("{}", render_value(&value)),
            None => return Err(CliError::ConfigKeyNotFound(key.to_string())),
        },
        (None, _) => {
            // Bare `config` and `config --list` both print everything.
            println!("Config file: {}", config.config_file().display());
            for (key, value) in config.list_all() {
                println!("  {} = {}", key, render_value(&value));
            }
        }
    }

    Ok(())
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_add_outcome(outcome: &repo_publish::ops::AddOutcome) {
    for name in &outcome.duplicates {
        println!("  = {} (already exists with same checksum)", name);
    }
    for name in &outcome.published {
        if outcome.updated.contains(name) {
            println!("  ~ {} (updated)", name);
        } else {
            println!("  + {}", name);
        }
    }
}

fn print_remove_outcome(outcome: &repo_publish::ops::RemoveOutcome) {
    for name in &outcome.removed {
        println!("  - {}", name);
    }
    for name in &outcome.missing {
        println!("  ? {} (not found in repository)", name);
    }
}

fn print_issues(issues: &[ValidationIssue]) {
    if issues.is_empty() {
        println!("All checks passed");
    } else {
        for issue in issues {
            eprintln!("  {}", issue);
        }
    }
}
