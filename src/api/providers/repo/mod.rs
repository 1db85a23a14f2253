//! Merge host provider trait and implementations
//!
//! Opens merge requests for closed branches and looks up hosted projects when a new
//! project is registered.

mod gitlab;

pub use gitlab::GitLabProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;

/// A project on the merge host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedProject {
    pub id: u64,
    pub name: String,
    /// Namespaced path, e.g. "team/api"
    pub path_with_namespace: Option<String>,
}

/// Request to open a merge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestDraft {
    pub project_id: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
}

impl MergeRequestDraft {
    /// Draft with the standard `merge <source> to <target> branch` title
    pub fn between(project_id: u64, source_branch: &str, target_branch: &str) -> Self {
        Self {
            project_id,
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            title: format!("merge {} to {} branch", source_branch, target_branch),
        }
    }
}

/// A merge request the host accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestInfo {
    /// Project-scoped number (GitLab `iid`)
    pub number: u64,
    pub web_url: Option<String>,
    pub created_at: Option<String>,
}

/// Trait for merge host providers (GitLab and friends)
#[async_trait]
pub trait MergeHost: Send + Sync {
    /// Get the provider name (e.g., "gitlab")
    fn name(&self) -> &str;

    async fn create_merge_request(
        &self,
        draft: &MergeRequestDraft,
    ) -> Result<MergeRequestInfo, ApiError>;

    /// Search hosted projects by name
    async fn search_projects(&self, query: &str) -> Result<Vec<HostedProject>, ApiError>;
}
