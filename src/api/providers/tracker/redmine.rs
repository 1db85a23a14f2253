//! Redmine issue tracker provider implementation

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{IssueTracker, IssueUpdate, NamedId, TimeEntry, TrackerIssue};
use crate::api::error::ApiError;

const PROVIDER_NAME: &str = "redmine";
const API_KEY_HEADER: &str = "X-Redmine-API-Key";

/// Redmine REST API provider
pub struct RedmineProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

// Redmine API response types
#[derive(Debug, Deserialize)]
struct IssueEnvelope {
    issue: RedmineIssue,
}

#[derive(Debug, Deserialize)]
struct RedmineIssue {
    id: u64,
    subject: String,
    tracker: Option<NamedId>,
    status: Option<NamedId>,
}

#[derive(Debug, Deserialize)]
struct ActivitiesEnvelope {
    time_entry_activities: Vec<NamedId>,
}

#[derive(Debug, Deserialize)]
struct StatusesEnvelope {
    issue_statuses: Vec<NamedId>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: RedmineUser,
}

#[derive(Debug, Deserialize)]
struct RedmineUser {
    id: u64,
    login: String,
    firstname: Option<String>,
    lastname: Option<String>,
}

#[derive(Debug, Serialize)]
struct IssueUpdateEnvelope<'a> {
    issue: &'a IssueUpdate,
}

#[derive(Debug, Serialize)]
struct TimeEntryEnvelope<'a> {
    time_entry: &'a TimeEntry,
}

impl RedmineProvider {
    /// Create a new Redmine provider for `base_url` (e.g. `https://redmine.example.com`)
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response, resource: &str) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(
            PROVIDER_NAME,
            status.as_u16(),
            resource,
            body,
        ))
    }

    /// Make an authenticated GET request
    async fn get<T: DeserializeOwned>(&self, path: &str, resource: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!("Redmine GET: {}", url);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Self::check(response, resource)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::http(PROVIDER_NAME, 0, format!("Parse error: {}", e)))
    }

    /// Send a JSON body; Redmine answers PUT with an empty body
    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
        resource: &str,
    ) -> Result<(), ApiError> {
        let url = self.url(path);
        debug!("Redmine {}: {}", method, url);

        let response = self
            .client
            .request(method, &url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Self::check(response, resource).await?;
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for RedmineProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> &str {
        &self.api_key
    }

    async fn get_issue(&self, issue_id: u64) -> Result<TrackerIssue, ApiError> {
        let path = format!("/issues/{}.json", issue_id);
        let envelope: IssueEnvelope = self.get(&path, &format!("issue #{}", issue_id)).await?;
        let issue = envelope.issue;

        Ok(TrackerIssue {
            id: issue.id,
            subject: issue.subject,
            tracker: issue.tracker.map(|t| t.name),
            status: issue.status,
        })
    }

    async fn list_activities(&self) -> Result<Vec<NamedId>, ApiError> {
        let envelope: ActivitiesEnvelope = self
            .get("/enumerations/time_entry_activities.json", "activities")
            .await?;
        Ok(envelope.time_entry_activities)
    }

    async fn list_statuses(&self) -> Result<Vec<NamedId>, ApiError> {
        let envelope: StatusesEnvelope = self.get("/issue_statuses.json", "statuses").await?;
        Ok(envelope.issue_statuses)
    }

    async fn current_user(&self) -> Result<NamedId, ApiError> {
        let envelope: UserEnvelope = self.get("/users/current.json", "current user").await?;
        let user = envelope.user;
        let full_name = match (user.firstname, user.lastname) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first,
            _ => user.login,
        };

        Ok(NamedId {
            id: user.id,
            name: full_name,
        })
    }

    async fn update_issue(&self, issue_id: u64, update: &IssueUpdate) -> Result<(), ApiError> {
        let path = format!("/issues/{}.json", issue_id);
        self.send_json(
            reqwest::Method::PUT,
            &path,
            &IssueUpdateEnvelope { issue: update },
            &format!("issue #{}", issue_id),
        )
        .await
    }

    async fn log_time(&self, entry: &TimeEntry) -> Result<(), ApiError> {
        self.send_json(
            reqwest::Method::POST,
            "/time_entries.json",
            &TimeEntryEnvelope { time_entry: entry },
            &format!("issue #{}", entry.issue_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> RedmineProvider {
        RedmineProvider::new(format!("{}/", server.uri()), "secret-key")
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = RedmineProvider::new("https://redmine.example.com/", "k");
        assert_eq!(provider.base_url(), "https://redmine.example.com");
        assert_eq!(
            provider.url("/issues/1.json"),
            "https://redmine.example.com/issues/1.json"
        );
    }

    #[tokio::test]
    async fn test_get_issue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues/42.json"))
            .and(header(API_KEY_HEADER, "secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issue": {
                    "id": 42,
                    "subject": "Login page",
                    "tracker": { "id": 2, "name": "Feature" },
                    "status": { "id": 1, "name": "New" }
                }
            })))
            .mount(&server)
            .await;

        let issue = provider(&server).await.get_issue(42).await.unwrap();

        assert_eq!(issue.id, 42);
        assert_eq!(issue.subject, "Login page");
        assert_eq!(issue.tracker.as_deref(), Some("Feature"));
        assert_eq!(issue.status.unwrap().name, "New");
    }

    #[tokio::test]
    async fn test_get_issue_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues/7.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = provider(&server).await.get_issue(7).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = provider(&server).await.current_user().await.unwrap_err();
        assert_eq!(err, ApiError::unauthorized("redmine"));
    }

    #[tokio::test]
    async fn test_enumerations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enumerations/time_entry_activities.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "time_entry_activities": [
                    { "id": 8, "name": "Design" },
                    { "id": 9, "name": "Development" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/issue_statuses.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issue_statuses": [
                    { "id": 1, "name": "New", "is_closed": false },
                    { "id": 3, "name": "Resolved", "is_closed": false }
                ]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server).await;
        let activities = provider.list_activities().await.unwrap();
        let statuses = provider.list_statuses().await.unwrap();

        assert_eq!(activities.len(), 2);
        assert_eq!(activities[1].name, "Development");
        assert_eq!(statuses[1], NamedId { id: 3, name: "Resolved".to_string() });
    }

    #[tokio::test]
    async fn test_current_user_full_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/current.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": { "id": 5, "login": "jdoe", "firstname": "Jo", "lastname": "Doe" }
            })))
            .mount(&server)
            .await;

        let user = provider(&server).await.current_user().await.unwrap();
        assert_eq!(user, NamedId { id: 5, name: "Jo Doe".to_string() });
    }

    #[tokio::test]
    async fn test_update_issue_wraps_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/issues/42.json"))
            .and(body_json(serde_json::json!({ "issue": { "status_id": 3 } })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server)
            .await
            .update_issue(42, &IssueUpdate::status(3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_log_time() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/time_entries.json"))
            .and(body_json(serde_json::json!({
                "time_entry": {
                    "issue_id": 42,
                    "hours": 0.5,
                    "comments": "wip (branch: feature/x#42)",
                    "activity_id": 9
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let entry = TimeEntry {
            issue_id: 42,
            hours: 0.5,
            comments: "wip (branch: feature/x#42)".to_string(),
            activity_id: 9,
        };
        provider(&server).await.log_time(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/time_entries.json"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string(r#"{"errors":["Hours is invalid"]}"#),
            )
            .mount(&server)
            .await;

        let entry = TimeEntry {
            issue_id: 1,
            hours: 0.0,
            comments: String::new(),
            activity_id: 1,
        };
        let err = provider(&server).await.log_time(&entry).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { .. }));
    }
}
