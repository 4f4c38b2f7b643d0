//! GitHub API client.
//!
//! Issues REST calls against one repository with bearer-token
//! authentication. The API base URL is resolved by configuration
//! (`https://api.github.com` or `{enterprise}/api/v3`); the client only
//! appends resource paths to it.

use crate::error::AppError;
use crate::models::{NodeStatus, ReleaseNode};
use crate::services::issue_tracker::{
    close_comment, issue_body, issue_title, post_comment_best_effort, status_comment,
    CreatedIssue, IssueFailure, IssueTracker, StatusUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;

/// GitHub API client configuration.
#[derive(Clone)]
pub struct GitHubClientConfig {
    /// API root, e.g. `https://api.github.com`.
    pub api_base_url: String,

    /// Repository owner (user or organization).
    pub owner: String,

    /// Repository name.
    pub repo: String,

    /// Personal access token.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GitHubClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    config: GitHubClientConfig,
}

/// The subset of GitHub's issue payload we keep.
#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    html_url: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn transport_failure(err: reqwest::Error) -> IssueFailure {
    if err.is_timeout() {
        IssueFailure::transport("Request timed out")
    } else if err.is_connect() {
        IssueFailure::transport("Failed to connect to GitHub")
    } else {
        IssueFailure::transport(err.to_string())
    }
}

/// Turn a non-success response into a failure carrying status and body.
async fn rejected(response: Response, context: &str) -> IssueFailure {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    IssueFailure::rejected(format!("{}: {}", context, status), status, body)
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(config: GitHubClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| AppError::configuration("Invalid GitHub token format"))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("ops-portal/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// URL of a resource under the configured repository.
    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path
        )
    }

    async fn set_state(
        &self,
        issue_number: u64,
        state: &str,
        context: &str,
    ) -> Result<(), IssueFailure> {
        let url = self.repo_url(&format!("/issues/{}", issue_number));
        let response = self
            .client
            .patch(&url)
            .json(&serde_json::json!({ "state": state }))
            .send()
            .await
            .map_err(transport_failure)?;

        if response.status() != StatusCode::OK {
            return Err(rejected(response, context).await);
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn create_issue(&self, node: &ReleaseNode) -> Result<CreatedIssue, IssueFailure> {
        let title = issue_title(node);
        log::debug!("[github] Creating issue: {}", title);

        let response = self
            .client
            .post(self.repo_url("/issues"))
            .json(&serde_json::json!({
                "title": title,
                "body": issue_body(node),
            }))
            .send()
            .await
            .map_err(transport_failure)?;

        if response.status() != StatusCode::CREATED {
            let failure = rejected(response, "Failed to create issue").await;
            log::warn!("[github] {} (node {})", failure, node.id);
            return Err(failure);
        }

        let issue: IssueResponse = response
            .json()
            .await
            .map_err(|e| IssueFailure::transport(format!("Failed to parse issue response: {}", e)))?;

        log::info!("[github] Created issue #{} for node {}", issue.number, node.id);

        Ok(CreatedIssue {
            issue_number: issue.number,
            issue_url: issue.html_url,
            issue_id: issue.id,
            created_at: issue.created_at.unwrap_or_else(Utc::now),
        })
    }

    async fn update_issue_status(
        &self,
        issue_number: u64,
        status: NodeStatus,
    ) -> Result<StatusUpdate, IssueFailure> {
        let remote_state = status.remote_state();
        self.set_state(
            issue_number,
            &remote_state.to_string(),
            "Failed to update issue state",
        )
        .await?;

        post_comment_best_effort(self, issue_number, &status_comment(status)).await;

        Ok(StatusUpdate {
            new_status: status,
            remote_state,
        })
    }

    async fn close_issue(&self, issue_number: u64, reason: &str) -> Result<(), IssueFailure> {
        self.set_state(issue_number, "closed", "Failed to close issue")
            .await?;
        post_comment_best_effort(self, issue_number, &close_comment(reason)).await;
        Ok(())
    }

    async fn add_comment(&self, issue_number: u64, body: &str) -> Result<(), IssueFailure> {
        let url = self.repo_url(&format!("/issues/{}/comments", issue_number));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(transport_failure)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejected(response, "Failed to add comment").await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> GitHubClientConfig {
        GitHubClientConfig {
            api_base_url: base.to_string(),
            owner: "acme".to_string(),
            repo: "app".to_string(),
            token: "ghp_test".to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_repo_url_construction() {
        let client = GitHubClient::new(config("https://api.github.com/")).unwrap();
        assert_eq!(
            client.repo_url("/issues/4/comments"),
            "https://api.github.com/repos/acme/app/issues/4/comments"
        );

        let client = GitHubClient::new(config("https://github.acme.io/api/v3")).unwrap();
        assert_eq!(
            client.repo_url("/issues"),
            "https://github.acme.io/api/v3/repos/acme/app/issues"
        );
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let mut cfg = config("https://api.github.com");
        cfg.token = "bad\ntoken".to_string();
        let err = GitHubClient::new(cfg).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_debug_hides_token() {
        let rendered = format!("{:?}", config("https://api.github.com"));
        assert!(!rendered.contains("ghp_test"));
    }
}
