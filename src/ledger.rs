//! Issue ledger: which branch is tracking which tracker issue.
//!
//! The ledger holds no state of its own. Each call loads the full record list from the
//! store, transforms it, and writes it back. Records are keyed by issue id alone, across
//! all projects.

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::store::{ConfigStore, ConfigStoreExt};

/// Store key holding the record list
pub const LEDGER_KEY: &str = "tracked_issues";

/// Correlation between one tracker issue and one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedIssueRecord {
    pub issue_id: u64,
    #[serde(rename = "pathName")]
    pub project_alias: String,
    pub branch_name: String,
    pub activity_id: u64,
    /// Unix epoch milliseconds of the last logged time entry (or branch creation)
    #[serde(rename = "lastTimeLog")]
    pub last_time_log_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
}

impl TrackedIssueRecord {
    pub fn new(
        issue_id: u64,
        project_alias: impl Into<String>,
        branch_name: impl Into<String>,
        activity_id: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            issue_id,
            project_alias: project_alias.into(),
            branch_name: branch_name.into(),
            activity_id,
            last_time_log_ms: created_at.timestamp_millis(),
            last_commit: None,
        }
    }

    pub fn last_time_log(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_time_log_ms).single()
    }
}

pub struct IssueLedger {
    store: Arc<dyn ConfigStore>,
}

impl IssueLedger {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub fn records(&self) -> Result<Vec<TrackedIssueRecord>> {
        self.store.load(LEDGER_KEY, Vec::new())
    }

    fn save_records(&self, records: &[TrackedIssueRecord]) -> Result<()> {
        self.store.save(LEDGER_KEY, &records)
    }

    /// Replace any record for the same issue id, then append
    pub fn upsert(&self, record: TrackedIssueRecord) -> Result<()> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|r| r.issue_id != record.issue_id);
        debug!(
            issue_id = record.issue_id,
            branch = %record.branch_name,
            replaced = before != records.len(),
            "Upserting tracked issue"
        );
        records.push(record);
        self.save_records(&records)
    }

    pub fn find(&self, issue_id: u64) -> Result<Option<TrackedIssueRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .find(|r| r.issue_id == issue_id))
    }

    pub fn find_by_branch(&self, branch_name: &str) -> Result<Option<TrackedIssueRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .find(|r| r.branch_name == branch_name))
    }

    /// Rewrite the time-log fields of an existing record
    pub fn record_commit(
        &self,
        issue_id: u64,
        commit_message: &str,
        logged_at: DateTime<Utc>,
    ) -> Result<TrackedIssueRecord> {
        let mut records = self.records()?;
        let record = records
            .iter_mut()
            .find(|r| r.issue_id == issue_id)
            .ok_or_else(|| anyhow!("issue #{} is not tracked", issue_id))?;

        record.last_time_log_ms = logged_at.timestamp_millis();
        record.last_commit = Some(commit_message.to_string());
        let updated = record.clone();

        self.save_records(&records)?;
        Ok(updated)
    }
}
