//! GitLab merge host provider implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{HostedProject, MergeHost, MergeRequestDraft, MergeRequestInfo};
use crate::api::error::ApiError;

const PROVIDER_NAME: &str = "gitlab";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// GitLab REST API (v4) provider
pub struct GitLabProvider {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

// Response types for API deserialization
#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    iid: u64,
    web_url: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    id: u64,
    name: String,
    path_with_namespace: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateMergeRequestBody<'a> {
    source_branch: &'a str,
    target_branch: &'a str,
    title: &'a str,
}

impl GitLabProvider {
    /// Create a new GitLab provider.
    ///
    /// `accept_invalid_certs` disables TLS verification for self-hosted instances with
    /// private certificates.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        accept_invalid_certs: bool,
    ) -> Result<Self, ApiError> {
        if accept_invalid_certs {
            warn!("TLS certificate verification disabled for GitLab");
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("branchflow/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.base_url, path)
    }

    async fn error_for(response: reqwest::Response, resource: &str) -> ApiError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ApiError::from_status(PROVIDER_NAME, status, resource, body)
    }
}

#[async_trait]
impl MergeHost for GitLabProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn create_merge_request(
        &self,
        draft: &MergeRequestDraft,
    ) -> Result<MergeRequestInfo, ApiError> {
        let url = self.api_url(&format!("/projects/{}/merge_requests", draft.project_id));
        debug!(%url, source = %draft.source_branch, target = %draft.target_branch, "Creating merge request");

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.token)
            .json(&CreateMergeRequestBody {
                source_branch: &draft.source_branch,
                target_branch: &draft.target_branch,
                title: &draft.title,
            })
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        if !response.status().is_success() {
            return Err(
                Self::error_for(response, &format!("project {}", draft.project_id)).await,
            );
        }

        let created: MergeRequestResponse = response
            .json()
            .await
            .map_err(|e| ApiError::http(PROVIDER_NAME, 0, format!("Parse error: {}", e)))?;

        Ok(MergeRequestInfo {
            number: created.iid,
            web_url: created.web_url,
            created_at: created.created_at,
        })
    }

    async fn search_projects(&self, query: &str) -> Result<Vec<HostedProject>, ApiError> {
        let url = self.api_url("/projects");
        debug!(%url, query, "Searching projects");

        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, &self.token)
            .query(&[("search", query)])
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, "projects").await);
        }

        let projects: Vec<ProjectResponse> = response
            .json()
            .await
            .map_err(|e| ApiError::http(PROVIDER_NAME, 0, format!("Parse error: {}", e)))?;

        Ok(projects
            .into_iter()
            .map(|p| HostedProject {
                id: p.id,
                name: p.name,
                path_with_namespace: p.path_with_namespace,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GitLabProvider {
        GitLabProvider::new(server.uri(), "glpat-test", false).unwrap()
    }

    #[tokio::test]
    async fn test_create_merge_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/12/merge_requests"))
            .and(header(TOKEN_HEADER, "glpat-test"))
            .and(body_json(serde_json::json!({
                "source_branch": "feature/login",
                "target_branch": "dev",
                "title": "merge feature/login to dev branch"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 9001,
                "iid": 7,
                "web_url": "https://gitlab.example.com/team/api/-/merge_requests/7",
                "created_at": "2024-05-01T10:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let draft = MergeRequestDraft::between(12, "feature/login", "dev");
        let info = provider(&server).create_merge_request(&draft).await.unwrap();

        assert_eq!(info.number, 7);
        assert!(info.web_url.unwrap().ends_with("/merge_requests/7"));
        assert!(info.created_at.is_some());
    }

    #[tokio::test]
    async fn test_create_merge_request_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/12/merge_requests"))
            .respond_with(ResponseTemplate::new(409).set_body_string(
                r#"{"message":["Another open merge request already exists for this source branch"]}"#,
            ))
            .mount(&server)
            .await;

        let draft = MergeRequestDraft::between(12, "feature/login", "dev");
        let err = provider(&server)
            .create_merge_request(&draft)
            .await
            .unwrap_err();

        match err {
            ApiError::Rejected { message, .. } => assert!(message.contains("already exists")),
            other => panic!("Expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_projects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .and(query_param("search", "api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 12, "name": "api", "path_with_namespace": "team/api" },
                { "id": 13, "name": "api-docs" }
            ])))
            .mount(&server)
            .await;

        let projects = provider(&server).search_projects("api").await.unwrap();

        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].path_with_namespace.as_deref(), Some("team/api"));
        assert_eq!(projects[1].id, 13);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let provider = GitLabProvider::new("http://127.0.0.1:1", "t", false).unwrap();
        let err = provider.search_projects("x").await.unwrap_err();
        assert!(matches!(err, ApiError::NetworkError { .. }));
    }
}
