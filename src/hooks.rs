//! Post-commit hook installed into a working copy while a branch tracks an issue.
//!
//! The hook calls back into `branchflow hook post-commit`, which logs time against the
//! issue (see [`crate::timelog`]).

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const HOOK_NAME: &str = "post-commit";

const HOOK_TEMPLATE: &str = r#"#!/bin/sh
# Installed by branchflow for issue #{{issue_id}}. Removed when the branch is closed.
export BRANCHFLOW_TRACKER__BASE_URL={{tracker_url}}
export BRANCHFLOW_TRACKER__API_KEY={{api_key}}
export BRANCHFLOW_STORE__PATH={{store_path}}

exec {{executable}} hook post-commit \
  --issue {{issue_id}} \
  --branch="$(git rev-parse --abbrev-ref HEAD)" \
  --message="$(git log -1 --pretty=%B)"
"#;

#[derive(Serialize)]
struct HookValues {
    issue_id: u64,
    tracker_url: String,
    api_key: String,
    store_path: String,
    executable: String,
}

/// Wrap a value in single quotes for `sh`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Location of the post-commit hook for a working copy
pub fn hook_path(workdir: &Path) -> PathBuf {
    workdir.join(".git").join("hooks").join(HOOK_NAME)
}

pub struct HookInstaller {
    executable: PathBuf,
    store_path: PathBuf,
}

impl HookInstaller {
    pub fn new(executable: impl Into<PathBuf>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            store_path: store_path.into(),
        }
    }

    /// Render the hook script for one issue
    pub fn render(&self, issue_id: u64, tracker_url: &str, api_key: &str) -> Result<String> {
        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        hb.register_template_string(HOOK_NAME, HOOK_TEMPLATE)
            .context("Failed to parse hook template")?;

        let values = HookValues {
            issue_id,
            tracker_url: shell_quote(tracker_url),
            api_key: shell_quote(api_key),
            store_path: shell_quote(&self.store_path.to_string_lossy()),
            executable: shell_quote(&self.executable.to_string_lossy()),
        };

        hb.render(HOOK_NAME, &values)
            .context("Failed to render hook template")
    }

    /// Write `.git/hooks/post-commit` and mark it executable
    pub fn install(
        &self,
        workdir: &Path,
        issue_id: u64,
        tracker_url: &str,
        api_key: &str,
    ) -> Result<PathBuf> {
        let script = self.render(issue_id, tracker_url, api_key)?;
        let path = hook_path(workdir);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, script)
            .with_context(|| format!("Failed to write hook {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("Failed to make {} executable", path.display()))?;
        }

        info!(issue_id, path = %path.display(), "Installed post-commit hook");
        Ok(path)
    }

    /// Delete the hook if present. Returns whether a file was removed.
    pub fn remove(&self, workdir: &Path) -> Result<bool> {
        let path = hook_path(workdir);
        if !path.exists() {
            debug!(path = %path.display(), "No post-commit hook to remove");
            return Ok(false);
        }

        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove hook {}", path.display()))?;
        info!(path = %path.display(), "Removed post-commit hook");
        Ok(true)
    }
}
