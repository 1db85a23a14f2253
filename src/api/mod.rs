//! API client modules for external service integrations
//!
//! This module provides:
//! - Provider traits for the issue tracker and the merge host
//! - Capabilities: which clients are available given the configured credentials
//! - Error handling shared by both providers

pub mod error;
pub mod providers;

pub use error::ApiError;
pub use providers::repo::{
    GitLabProvider, HostedProject, MergeHost, MergeRequestDraft, MergeRequestInfo,
};
pub use providers::tracker::{
    IssueTracker, IssueUpdate, NamedId, RedmineProvider, TimeEntry, TrackerIssue,
};

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;

/// Clients available for this run
///
/// A client exists only when its credentials are configured. Whether a given project
/// uses it is decided separately by the project's enabled integrations.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub tracker: Option<Arc<dyn IssueTracker>>,
    pub merge_host: Option<Arc<dyn MergeHost>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let tracker = config.tracker.credentials().map(|(url, key)| {
            debug!(url, "Issue tracker configured");
            Arc::new(RedmineProvider::new(url, key)) as Arc<dyn IssueTracker>
        });

        let merge_host = config
            .merge_host
            .credentials()
            .and_then(|(url, token)| {
                match GitLabProvider::new(url, token, config.merge_host.accept_invalid_certs) {
                    Ok(provider) => {
                        debug!(url, "Merge host configured");
                        Some(Arc::new(provider) as Arc<dyn MergeHost>)
                    }
                    Err(e) => {
                        warn!("Merge host client unavailable: {}", e);
                        None
                    }
                }
            });

        Self {
            tracker,
            merge_host,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn IssueTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_merge_host(mut self, merge_host: Arc<dyn MergeHost>) -> Self {
        self.merge_host = Some(merge_host);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_configured() {
        let caps = Capabilities::from_config(&Config::default());
        assert!(caps.tracker.is_none());
        assert!(caps.merge_host.is_none());
    }

    #[test]
    fn test_configured_clients() {
        let mut config = Config::default();
        config.tracker.base_url = Some("https://redmine.example.com".to_string());
        config.tracker.api_key = Some("key".to_string());
        config.merge_host.base_url = Some("https://gitlab.example.com".to_string());
        config.merge_host.access_token = Some("token".to_string());

        let caps = Capabilities::from_config(&config);
        assert_eq!(caps.tracker.as_ref().unwrap().name(), "redmine");
        assert_eq!(caps.merge_host.as_ref().unwrap().name(), "gitlab");
    }
}
