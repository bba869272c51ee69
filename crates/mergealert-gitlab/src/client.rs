//! GitLab REST client for the calls Merge Alert needs: project lookup,
//! hook listing, creation and deletion, and a token check.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::GitLabError;

/// User-Agent sent on every GitLab call.
pub const USER_AGENT: &str = concat!("GitLab-Merge-Alert/", env!("CARGO_PKG_VERSION"));

/// Instance base URL plus the token used against it.
#[derive(Clone)]
pub struct GitLabEndpoint {
    /// `scheme://host[:port]`.
    pub base_url: String,
    token: String,
}

impl GitLabEndpoint {
    /// Create an endpoint.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// The plaintext token sent with every call.
    pub fn token(&self) -> &str {
        &self.token
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v4{path}", self.base_url)
    }

    /// Attach the auth header GitLab expects for this token type.
    ///
    /// Personal and CI job tokens (`glpat-`, `glcbt-`) go in a bearer
    /// header; anything else uses `PRIVATE-TOKEN`.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else if self.token.starts_with("glpat-") || self.token.starts_with("glcbt-") {
            request.bearer_auth(&self.token)
        } else {
            request.header("PRIVATE-TOKEN", &self.token)
        }
    }
}

impl fmt::Debug for GitLabEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLabEndpoint")
            .field("base_url", &self.base_url)
            .field("token", &"***")
            .finish()
    }
}

/// A project hook as returned by GitLab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHook {
    /// Hook id.
    pub id: i64,
    /// Target URL.
    pub url: String,
    /// Fires on merge-request events.
    #[serde(default)]
    pub merge_requests_events: bool,
    /// Fires on pushes.
    #[serde(default)]
    pub push_events: bool,
    /// Fires on issue events.
    #[serde(default)]
    pub issues_events: bool,
    /// TLS verification when GitLab calls the hook.
    #[serde(default)]
    pub enable_ssl_verification: bool,
}

/// Project summary from `GET /projects/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabProject {
    /// GitLab project id.
    pub id: i64,
    /// Project name.
    pub name: String,
    /// `group/project`.
    #[serde(default)]
    pub path_with_namespace: String,
    /// Web URL.
    #[serde(default)]
    pub web_url: String,
    /// Default branch.
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateHookRequest<'a> {
    url: &'a str,
    merge_requests_events: bool,
    push_events: bool,
    issues_events: bool,
    enable_ssl_verification: bool,
}

/// GitLab operations used by the reconciler and the API layer.
#[async_trait]
pub trait GitLabApi: Send + Sync + std::fmt::Debug + 'static {
    /// Look up a project by numeric id or `group/project` path.
    async fn get_project(
        &self,
        endpoint: &GitLabEndpoint,
        project: &str,
    ) -> Result<GitLabProject, GitLabError>;

    /// All hooks configured on a project.
    async fn list_hooks(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
    ) -> Result<Vec<ProjectHook>, GitLabError>;

    /// Create a merge-request-only hook pointing at `url`.
    async fn create_hook(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
        url: &str,
    ) -> Result<ProjectHook, GitLabError>;

    /// Delete one hook.
    async fn delete_hook(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
        hook_id: i64,
    ) -> Result<(), GitLabError>;

    /// Verify the token against `GET /user`.
    async fn test_connection(&self, endpoint: &GitLabEndpoint) -> Result<(), GitLabError>;

    /// First hook whose URL equals `url` exactly.
    async fn find_hook_by_url(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
        url: &str,
    ) -> Result<Option<ProjectHook>, GitLabError> {
        Ok(self
            .list_hooks(endpoint, project_id)
            .await?
            .into_iter()
            .find(|hook| hook.url == url))
    }

    /// Every hook whose URL equals `url` exactly.
    async fn find_all_hooks_by_url(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
        url: &str,
    ) -> Result<Vec<ProjectHook>, GitLabError> {
        Ok(self
            .list_hooks(endpoint, project_id)
            .await?
            .into_iter()
            .filter(|hook| hook.url == url)
            .collect())
    }
}

/// `reqwest`-backed [`GitLabApi`].
#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
}

impl GitLabClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    async fn execute(request: RequestBuilder, expected: StatusCode) -> Result<Response, GitLabError> {
        let response = request.send().await?;
        let status = response.status();
        if status == expected {
            return Ok(response);
        }

        Err(match status {
            StatusCode::UNAUTHORIZED => GitLabError::Unauthorized,
            StatusCode::FORBIDDEN => GitLabError::Forbidden,
            StatusCode::NOT_FOUND => GitLabError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => GitLabError::RateLimited,
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                GitLabError::Unprocessable(body)
            }
            other => GitLabError::Status(other.as_u16()),
        })
    }
}

impl Default for GitLabClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn get_project(
        &self,
        endpoint: &GitLabEndpoint,
        project: &str,
    ) -> Result<GitLabProject, GitLabError> {
        let encoded = utf8_percent_encode(project.trim(), NON_ALPHANUMERIC);
        let request = endpoint.authorize(self.http.get(endpoint.api(&format!("/projects/{encoded}"))));
        let response = Self::execute(request, StatusCode::OK).await?;
        Ok(response.json().await?)
    }

    async fn list_hooks(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
    ) -> Result<Vec<ProjectHook>, GitLabError> {
        let request =
            endpoint.authorize(self.http.get(endpoint.api(&format!("/projects/{project_id}/hooks"))));
        let response = Self::execute(request, StatusCode::OK).await?;
        Ok(response.json().await?)
    }

    async fn create_hook(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
        url: &str,
    ) -> Result<ProjectHook, GitLabError> {
        let body = CreateHookRequest {
            url,
            merge_requests_events: true,
            push_events: false,
            issues_events: false,
            enable_ssl_verification: false,
        };
        let request = endpoint.authorize(
            self.http
                .post(endpoint.api(&format!("/projects/{project_id}/hooks")))
                .json(&body),
        );
        let response = Self::execute(request, StatusCode::CREATED).await?;
        let hook: ProjectHook = response.json().await?;
        tracing::info!(project_id, hook_id = hook.id, "Created GitLab project hook");
        Ok(hook)
    }

    async fn delete_hook(
        &self,
        endpoint: &GitLabEndpoint,
        project_id: i64,
        hook_id: i64,
    ) -> Result<(), GitLabError> {
        let request = endpoint.authorize(
            self.http
                .delete(endpoint.api(&format!("/projects/{project_id}/hooks/{hook_id}"))),
        );
        Self::execute(request, StatusCode::NO_CONTENT).await?;
        tracing::info!(project_id, hook_id, "Deleted GitLab project hook");
        Ok(())
    }

    async fn test_connection(&self, endpoint: &GitLabEndpoint) -> Result<(), GitLabError> {
        let request = endpoint.authorize(self.http.get(endpoint.api("/user")));
        Self::execute(request, StatusCode::OK).await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::spawn;
    use super::*;

    const CALLBACK: &str = "https://alerts.example.com/api/v1/webhook/gitlab";

    #[tokio::test]
    async fn test_list_and_find_by_exact_url() {
        let gitlab = spawn().await;
        gitlab.state.add_hook(7, 1, "https://other.example.com/hook");
        gitlab.state.add_hook(7, 2, CALLBACK);
        gitlab.state.add_hook(7, 3, CALLBACK);
        let endpoint = GitLabEndpoint::new(&gitlab.base_url, "glpat-secret");
        let client = GitLabClient::default();

        assert_eq!(client.list_hooks(&endpoint, 7).await.unwrap().len(), 3);
        let found = client.find_hook_by_url(&endpoint, 7, CALLBACK).await.unwrap();
        assert_eq!(found.map(|h| h.id), Some(2));
        let all = client.find_all_hooks_by_url(&endpoint, 7, CALLBACK).await.unwrap();
        assert_eq!(all.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2, 3]);
        assert!(
            client
                .find_hook_by_url(&endpoint, 7, &format!("{CALLBACK}/"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_auth_header_depends_on_token_prefix() {
        let gitlab = spawn().await;
        let client = GitLabClient::default();

        for token in ["glpat-abc", "glcbt-def", "legacy-token"] {
            client
                .list_hooks(&GitLabEndpoint::new(&gitlab.base_url, token), 1)
                .await
                .unwrap();
        }

        let seen = gitlab.state.auth_headers.lock().unwrap().clone();
        assert_eq!(seen[0], (Some("Bearer glpat-abc".to_string()), None));
        assert_eq!(seen[1], (Some("Bearer glcbt-def".to_string()), None));
        assert_eq!(seen[2], (None, Some("legacy-token".to_string())));
    }

    #[tokio::test]
    async fn test_create_and_delete_hook() {
        let gitlab = spawn().await;
        let endpoint = GitLabEndpoint::new(&gitlab.base_url, "glpat-secret");
        let client = GitLabClient::default();

        let hook = client.create_hook(&endpoint, 5, CALLBACK).await.unwrap();
        assert_eq!(hook.url, CALLBACK);
        assert!(hook.merge_requests_events);
        assert_eq!(gitlab.state.hooks_for(5).len(), 1);

        client.delete_hook(&endpoint, 5, hook.id).await.unwrap();
        assert!(gitlab.state.hooks_for(5).is_empty());

        let err = client.delete_hook(&endpoint, 5, hook.id).await.unwrap_err();
        assert!(matches!(err, GitLabError::NotFound));
    }

    #[tokio::test]
    async fn test_status_mapping_and_connection_check() {
        let gitlab = spawn().await;
        gitlab.state.fail_project(9);
        let client = GitLabClient::default();
        let endpoint = GitLabEndpoint::new(&gitlab.base_url, "glpat-secret");

        let err = client.list_hooks(&endpoint, 9).await.unwrap_err();
        assert!(matches!(err, GitLabError::Status(500)));

        client.test_connection(&endpoint).await.unwrap();
        let err = client
            .test_connection(&GitLabEndpoint::new(&gitlab.base_url, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, GitLabError::Unauthorized));
    }

    #[test]
    fn test_endpoint_debug_hides_token() {
        let endpoint = GitLabEndpoint::new("https://gitlab.example.com/", "glpat-secret");
        let debug = format!("{endpoint:?}");
        assert!(!debug.contains("glpat-secret"));
        assert_eq!(endpoint.base_url, "https://gitlab.example.com");
    }
}
