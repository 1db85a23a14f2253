//! Issue tracker provider trait and implementations
//!
//! The tracker supplies issue metadata, activity and status enumerations, and accepts
//! field updates and time entries.

mod redmine;

pub use redmine::RedmineProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;

/// Issue metadata from the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerIssue {
    pub id: u64,
    pub subject: String,
    /// Tracker (issue type) name, e.g. "Bug"
    pub tracker: Option<String>,
    pub status: Option<NamedId>,
}

/// An `{id, name}` pair: activities, statuses, users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedId {
    pub id: u64,
    pub name: String,
}

/// Fields to change on an issue; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueUpdate {
    #[serde(rename = "assigned_to_id", skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<u64>,
    #[serde(rename = "estimated_hours", skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "status_id", skip_serializing_if = "Option::is_none")]
    pub status_id: Option<u64>,
}

impl IssueUpdate {
    pub fn status(status_id: u64) -> Self {
        Self {
            status_id: Some(status_id),
            ..Self::default()
        }
    }
}

/// A time-log entry posted on each commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub issue_id: u64,
    pub hours: f64,
    pub comments: String,
    pub activity_id: u64,
}

/// Trait for issue tracker providers
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Get the provider name (e.g., "redmine")
    fn name(&self) -> &str;

    /// Base URL, passed on to the post-commit hook
    fn base_url(&self) -> &str;

    /// API key, passed on to the post-commit hook
    fn api_key(&self) -> &str;

    /// Fetch one issue. A missing issue is `ApiError::NotFound`.
    async fn get_issue(&self, issue_id: u64) -> Result<TrackerIssue, ApiError>;

    /// Time-entry activities (used to classify logged time)
    async fn list_activities(&self) -> Result<Vec<NamedId>, ApiError>;

    /// Workflow statuses an issue can move to
    async fn list_statuses(&self) -> Result<Vec<NamedId>, ApiError>;

    /// The user owning the API key
    async fn current_user(&self) -> Result<NamedId, ApiError>;

    async fn update_issue(&self, issue_id: u64, update: &IssueUpdate) -> Result<(), ApiError>;

    async fn log_time(&self, entry: &TimeEntry) -> Result<(), ApiError>;
}
