//! Git command lines for the branch workflow.
//!
//! Uses the git CLI directly. Mutating commands are built as [`CommandStep`]s and run
//! by the sequencer; read-only queries go through [`ProcessRunner::exec`].

use anyhow::{anyhow, Result};
use std::path::Path;
use tracing::{debug, instrument};

use crate::sequencer::{CommandStep, ProcessRunner};

/// Builds the git lines the lifecycle runs
pub struct GitCommands;

impl GitCommands {
    pub const CURRENT_BRANCH: &'static str = "git rev-parse --abbrev-ref HEAD";

    pub fn checkout(branch: &str) -> CommandStep {
        CommandStep::run(format!("git checkout {}", branch))
    }

    pub fn checkout_new(branch: &str) -> CommandStep {
        CommandStep::run(format!("git checkout -b {}", branch))
    }

    pub fn merge(branch: &str) -> CommandStep {
        CommandStep::run(format!("git merge {}", branch))
    }

    /// Annotated tag `v<version>`
    pub fn annotated_tag(version: &str, message: &str) -> CommandStep {
        CommandStep::run(format!("git tag -a v{} -m \"{}\"", version, message))
    }

    /// Remote steps are skipped when `offline` is set
    pub fn pull(remote: &str, branch: &str, offline: bool) -> CommandStep {
        CommandStep::unless(offline, format!("git pull {} {}", remote, branch))
    }

    pub fn push(remote: &str, branch: &str, offline: bool) -> CommandStep {
        CommandStep::unless(offline, format!("git push {} {}", remote, branch))
    }

    pub fn push_tags(remote: &str, offline: bool) -> CommandStep {
        CommandStep::unless(offline, format!("git push {} --tags", remote))
    }
}

/// Read-only git queries
pub struct GitCli;

impl GitCli {
    /// Get the current branch name
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn current_branch(runner: &dyn ProcessRunner, path: &Path) -> Result<String> {
        let output = runner.exec(GitCommands::CURRENT_BRANCH, path).await?;
        if !output.success() {
            return Err(anyhow!(
                "git rev-parse failed with exit code {}",
                output.exit_code
            ));
        }

        let branch = output.stdout.trim().to_string();
        if branch.is_empty() {
            return Err(anyhow!("git rev-parse returned no branch name"));
        }

        debug!(%branch, "Current branch");
        Ok(branch)
    }

    /// Check the git binary is reachable on PATH
    pub fn is_installed() -> bool {
        which::which("git").is_ok()
    }
}
