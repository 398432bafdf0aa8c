// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! External tool invocation.

Metadata generation and package inspection delegate to tools assumed present
on `PATH`: `createrepo_c`, `rpm`, and `dpkg-deb`. Invocations go through the
[ToolInvoker] trait so tests can substitute a stub that fabricates output
without the tools installed.
*/

use {
    crate::error::{RepoPublishError, Result},
    std::{path::Path, process::Command},
};

/// Captured output of an external tool run.
#[derive(Clone, Debug)]
pub struct ToolOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external programs. Implemented by [SystemInvoker] in production and
/// by stubs in tests.
pub trait ToolInvoker: Send + Sync {
    /// Run a program with arguments, optionally in a working directory.
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<ToolOutput>;
}

/// Invokes tools via the system process spawner.
pub struct SystemInvoker;

impl ToolInvoker for SystemInvoker {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<ToolOutput> {
        let mut command = Command::new(program);
        command.args(args);

        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let output = command
            .output()
            .map_err(|e| RepoPublishError::ToolNotRunnable(program.to_string(), e))?;

        Ok(ToolOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run a tool, mapping non-zero exit into [RepoPublishError::ToolFailure].
pub fn run_checked(
    invoker: &dyn ToolInvoker,
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<ToolOutput> {
    let output = invoker.run(program, args, cwd)?;

    if !output.success() {
        return Err(RepoPublishError::ToolFailure {
            tool: program.to_string(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(output)
}

/// Generate repository XML metadata for the packages in `dir`.
///
/// Always passes `--no-database`: the sqlite mirrors are rebuilt by this
/// engine after every mutation, so the generator must not emit competing
/// `*_db` records.
pub fn run_createrepo(invoker: &dyn ToolInvoker, dir: &Path) -> Result<()> {
    let dir_str = dir.to_string_lossy();

    run_checked(invoker, "createrepo_c", &["--no-database", &dir_str], None)?;

    Ok(())
}
