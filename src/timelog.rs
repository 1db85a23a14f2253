//! Commit-driven time logging, run by the post-commit hook.
//!
//! Each commit on a tracked branch books the time elapsed since the previous booking
//! (or since the branch was created) against the linked issue.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::api::{IssueTracker, TimeEntry};
use crate::ledger::IssueLedger;

/// Bookings shorter than this are skipped
const MIN_MINUTES: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum TimeLogOutcome {
    Logged { hours: f64 },
    Skipped { minutes: f64 },
}

/// Elapsed minutes rounded to one decimal
pub fn elapsed_minutes(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - since).num_milliseconds() as f64;
    (millis / 60_000.0 * 10.0).round() / 10.0
}

/// Minutes to hours, rounded to two decimals
pub fn minutes_to_hours(minutes: f64) -> f64 {
    (minutes / 60.0 * 100.0).round() / 100.0
}

pub async fn record_commit(
    ledger: &IssueLedger,
    tracker: &dyn IssueTracker,
    issue_id: u64,
    branch: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<TimeLogOutcome> {
    let message = message.trim();
    let record = match ledger.find(issue_id)? {
        Some(record) => record,
        None => bail!("issue #{} is not tracked", issue_id),
    };

    if record.branch_name != branch {
        bail!(
            "issue #{} is tracked on '{}', not on '{}'",
            issue_id,
            record.branch_name,
            branch
        );
    }

    let since = record
        .last_time_log()
        .with_context(|| format!("invalid last time log for issue #{}", issue_id))?;
    let minutes = elapsed_minutes(since, now);
    if minutes < MIN_MINUTES {
        debug!(issue_id, minutes, "Too little time since last booking");
        return Ok(TimeLogOutcome::Skipped { minutes });
    }

    let hours = minutes_to_hours(minutes);
    let entry = TimeEntry {
        issue_id,
        hours,
        comments: format!("{} (branch: {})", message, branch),
        activity_id: record.activity_id,
    };
    tracker
        .log_time(&entry)
        .await
        .with_context(|| format!("Failed to log time on issue #{}", issue_id))?;

    ledger.record_commit(issue_id, message, now)?;
    info!(issue_id, hours, "Logged time");

    Ok(TimeLogOutcome::Logged { hours })
}
