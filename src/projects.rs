//! Saved projects: where each working copy lives and how its branches are named.
//!
//! Projects are kept in the store under `paths`; the alias picked last time under
//! `last_path_name` and offered as the default next time.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::MergeHost;
use crate::prompt::{Prompter, SelectOption};
use crate::store::{ConfigStore, ConfigStoreExt};

pub const PROJECTS_KEY: &str = "paths";
pub const LAST_SELECTED_KEY: &str = "last_path_name";

/// Value of the "add new project" entry in the selection prompt
const ADD_PROJECT_VALUE: &str = "add_path";
/// Value of the "no hosted project" entry in the merge host project prompt
const NO_HOSTED_PROJECT: &str = "0";

/// External services a project opts into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Integration {
    #[serde(rename = "redmine", alias = "issue_tracker")]
    IssueTracker,
    #[serde(rename = "gitlab", alias = "merge_host")]
    MergeHost,
}

/// One registered working copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    #[serde(rename = "name")]
    pub alias: String,
    #[serde(rename = "path")]
    pub working_directory: PathBuf,
    #[serde(rename = "devBranch")]
    pub dev_branch: String,
    #[serde(rename = "masterBranch")]
    pub master_branch: String,
    #[serde(rename = "remoteName")]
    pub remote: String,
    #[serde(default)]
    pub integrations: BTreeSet<Integration>,
    /// Project id on the merge host
    #[serde(default, rename = "gitlabProjectId", skip_serializing_if = "Option::is_none")]
    pub merge_host_project_id: Option<u64>,
}

impl ProjectContext {
    pub fn new(alias: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            alias: alias.into(),
            working_directory: working_directory.into(),
            dev_branch: "dev".to_string(),
            master_branch: "master".to_string(),
            remote: "origin".to_string(),
            integrations: BTreeSet::new(),
            merge_host_project_id: None,
        }
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integrations.insert(integration);
        self
    }

    pub fn with_merge_host_project(mut self, project_id: u64) -> Self {
        self.merge_host_project_id = Some(project_id);
        self
    }

    pub fn uses(&self, integration: Integration) -> bool {
        self.integrations.contains(&integration)
    }
}

/// Resolves a project alias to its [`ProjectContext`]
pub struct PathRegistry {
    store: Arc<dyn ConfigStore>,
}

impl PathRegistry {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub fn projects(&self) -> Result<Vec<ProjectContext>> {
        self.store.load(PROJECTS_KEY, Vec::new())
    }

    pub fn find(&self, alias: &str) -> Result<Option<ProjectContext>> {
        Ok(self.projects()?.into_iter().find(|p| p.alias == alias))
    }

    pub fn last_selected(&self) -> Result<Option<String>> {
        self.store.load(LAST_SELECTED_KEY, None)
    }

    pub fn record_selection(&self, alias: &str) -> Result<()> {
        self.store.save(LAST_SELECTED_KEY, &alias)
    }

    /// Add or replace a project by alias
    pub fn save_project(&self, project: &ProjectContext) -> Result<()> {
        let mut projects = self.projects()?;
        projects.retain(|p| p.alias != project.alias);
        projects.push(project.clone());
        self.store.save(PROJECTS_KEY, &projects)
    }

    /// Choose the project for this run.
    ///
    /// An explicit alias skips the prompt. Otherwise the saved aliases are offered,
    /// plus an entry to register a new project; the previous choice is preselected.
    pub async fn select(
        &self,
        prompter: &dyn Prompter,
        explicit: Option<&str>,
        merge_host: Option<&dyn MergeHost>,
    ) -> Result<ProjectContext> {
        if let Some(alias) = explicit {
            let project = self
                .find(alias)?
                .ok_or_else(|| anyhow!("no saved project named '{}'", alias))?;
            self.record_selection(alias)?;
            return Ok(project);
        }

        let projects = self.projects()?;
        let mut options: Vec<SelectOption> = projects
            .iter()
            .map(|p| SelectOption::new(&p.alias, &p.alias))
            .collect();
        options.push(SelectOption::new("Add new project", ADD_PROJECT_VALUE));

        let last = self
            .last_selected()?
            .filter(|alias| projects.iter().any(|p| &p.alias == alias));
        let default = last.as_deref().unwrap_or(ADD_PROJECT_VALUE);

        let choice = prompter.select(
            "select a saved project or add a new one",
            &options,
            Some(default),
        )?;

        if choice == ADD_PROJECT_VALUE {
            return self.add_project(prompter, merge_host).await;
        }

        self.record_selection(&choice)?;
        projects
            .into_iter()
            .find(|p| p.alias == choice)
            .ok_or_else(|| anyhow!("no saved project named '{}'", choice))
    }

    /// Register a project interactively and make it the last selection
    pub async fn add_project(
        &self,
        prompter: &dyn Prompter,
        merge_host: Option<&dyn MergeHost>,
    ) -> Result<ProjectContext> {
        let alias = prompter.input("Enter name of your new project", None)?;
        if alias.trim().is_empty() {
            return Err(anyhow!("project name must not be empty"));
        }
        let path = prompter.input("Enter path of your new project", None)?;

        let mut project = ProjectContext::new(alias.trim(), path.trim());
        project.dev_branch = prompter.input(
            "Enter dev branch name of your new project (default \"dev\")",
            Some("dev"),
        )?;
        project.master_branch = prompter.input(
            "Enter master branch name of your new project (default \"master\")",
            Some("master"),
        )?;
        project.remote = prompter.input(
            "Enter remote name of your new project (default \"origin\")",
            Some("origin"),
        )?;

        if prompter.confirm("Do you use the GitLab (merge request) integration?", false)? {
            project.integrations.insert(Integration::MergeHost);
            if let Some(host) = merge_host {
                project.merge_host_project_id =
                    pick_hosted_project(prompter, host, &project.alias).await?;
            } else {
                warn!("Merge host credentials not configured; merge requests will be manual");
            }
        }

        if prompter.confirm("Do you use the Redmine (issue tracker) integration?", false)? {
            project.integrations.insert(Integration::IssueTracker);
        }

        self.save_project(&project)?;
        self.record_selection(&project.alias)?;
        info!(alias = %project.alias, "Registered project");

        Ok(project)
    }
}

async fn pick_hosted_project(
    prompter: &dyn Prompter,
    host: &dyn MergeHost,
    alias: &str,
) -> Result<Option<u64>> {
    let name = prompter.input("Enter name of your project in GitLab", Some(alias))?;
    debug!(%name, "Searching hosted projects");

    let found = match host.search_projects(&name).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Project search failed: {}", e);
            return Ok(None);
        }
    };

    let mut options: Vec<SelectOption> = found
        .iter()
        .map(|p| {
            let label = p.path_with_namespace.as_deref().unwrap_or(&p.name);
            SelectOption::new(label, p.id.to_string())
        })
        .collect();
    options.push(SelectOption::new("Not selected", NO_HOSTED_PROJECT));

    let choice = prompter.select("Select GitLab project", &options, None)?;
    Ok(choice.parse::<u64>().ok().filter(|id| *id != 0))
}
