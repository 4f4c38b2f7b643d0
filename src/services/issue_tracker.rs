//! Issue tracker abstraction.
//!
//! The release sync orchestrator talks to GitHub through [`IssueTracker`]
//! so it can be driven by the real HTTP client or by an in-process fake.
//! Implementations report remote failures as [`IssueFailure`] values.

use crate::error::AppError;
use crate::models::{GitHubIssueRef, IssueState, NodeStatus, ReleaseNode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Issue created for a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIssue {
    pub issue_number: u64,
    pub issue_url: String,
    pub issue_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl CreatedIssue {
    /// External reference to store on the node.
    pub fn into_ref(self) -> GitHubIssueRef {
        GitHubIssueRef {
            issue_number: self.issue_number,
            issue_url: self.issue_url,
            issue_id: self.issue_id,
            created_at: self.created_at,
            last_synced: None,
        }
    }
}

/// Outcome of a successful status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub new_status: NodeStatus,
    pub remote_state: IssueState,
}

/// A remote call that did not succeed.
///
/// `status_code` is absent for transport failures; `details` holds the raw
/// response body when there was one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct IssueFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IssueFailure {
    /// Failure without a remote response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            details: None,
        }
    }

    /// Remote rejected the request.
    pub fn rejected(message: impl Into<String>, status_code: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            message: message.into(),
            status_code: Some(status_code),
            details: (!body.is_empty()).then_some(body),
        }
    }
}

impl From<IssueFailure> for AppError {
    fn from(failure: IssueFailure) -> Self {
        match failure.status_code {
            Some(status_code) => AppError::github_api(failure.message, status_code),
            None => AppError::network(failure.message),
        }
    }
}

/// Remote issue tracker operations used by the orchestrator.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Create an issue for `node`. Never sets labels or assignees.
    async fn create_issue(&self, node: &ReleaseNode) -> Result<CreatedIssue, IssueFailure>;

    /// Move the issue to the remote state for `status`, then leave a
    /// best-effort comment.
    async fn update_issue_status(
        &self,
        issue_number: u64,
        status: NodeStatus,
    ) -> Result<StatusUpdate, IssueFailure>;

    /// Close the issue, then leave a best-effort comment with `reason`.
    async fn close_issue(&self, issue_number: u64, reason: &str) -> Result<(), IssueFailure>;

    /// Post a comment.
    async fn add_comment(&self, issue_number: u64, body: &str) -> Result<(), IssueFailure>;
}

/// Post a comment and discard any failure.
pub async fn post_comment_best_effort(tracker: &dyn IssueTracker, issue_number: u64, body: &str) {
    if let Err(e) = tracker.add_comment(issue_number, body).await {
        log::warn!(
            "[github] Comment on issue #{} was not posted: {}",
            issue_number,
            e
        );
    }
}

/// Issue title for a node, e.g. `[FEATURE] User Dashboard`.
pub fn issue_title(node: &ReleaseNode) -> String {
    format!(
        "[{}] {}",
        node.node_type.to_string().to_uppercase(),
        node.title
    )
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

/// Markdown issue body for a node.
pub fn issue_body(node: &ReleaseNode) -> String {
    let props = &node.properties;
    format!(
        "## Description\n{}\n\n## Details\n\
         - **Type**: {}\n\
         - **Priority**: {}\n\
         - **Status**: {}\n\
         - **Version**: {}\n\
         - **Assignee**: {}\n\n\
         ---\n\
         *Created from Release Management Tool*\n\
         *Node ID: {}*\n",
        or_placeholder(&props.description, "No description provided"),
        node.node_type,
        props.priority,
        props.status,
        or_placeholder(&props.version, "N/A"),
        or_placeholder(&props.assignee, "Unassigned"),
        node.id,
    )
}

pub fn status_comment(status: NodeStatus) -> String {
    format!(
        "Status updated to: **{}**\n\n*Updated from Release Management Tool*",
        status
    )
}

pub fn close_comment(reason: &str) -> String {
    format!(
        "Issue closed: {}\n\n*Closed from Release Management Tool*",
        reason
    )
}

/// Comment posted on a parent issue pointing at a child issue.
pub fn link_comment(child_issue_number: u64, child_title: &str) -> String {
    format!("Sub-task: #{} - {}", child_issue_number, child_title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;

    #[test]
    fn test_issue_title_uses_upper_case_type() {
        let node = ReleaseNode::new("node-2", "User Dashboard", NodeType::Feature);
        assert_eq!(issue_title(&node), "[FEATURE] User Dashboard");
    }

    #[test]
    fn test_issue_body_placeholders() {
        let node = ReleaseNode::new("node-9", "Charts", NodeType::Task);
        let body = issue_body(&node);

        assert!(body.starts_with("## Description\nNo description provided\n"));
        assert!(body.contains("- **Type**: task\n"));
        assert!(body.contains("- **Priority**: medium\n"));
        assert!(body.contains("- **Status**: planning\n"));
        assert!(body.contains("- **Version**: N/A\n"));
        assert!(body.contains("- **Assignee**: Unassigned\n"));
        assert!(body.ends_with("*Node ID: node-9*\n"));
    }

    #[test]
    fn test_issue_body_renders_properties() {
        let mut node = ReleaseNode::new("node-3", "API", NodeType::Feature);
        node.properties.description = "Public REST API".into();
        node.properties.version = "2.0.0".into();
        node.properties.assignee = "jane".into();
        node.properties.status = NodeStatus::InDevelopment;

        let body = issue_body(&node);
        assert!(body.contains("Public REST API"));
        assert!(body.contains("- **Status**: in-development\n"));
        assert!(body.contains("- **Version**: 2.0.0\n"));
        assert!(body.contains("- **Assignee**: jane\n"));
    }

    #[test]
    fn test_comment_texts() {
        assert_eq!(link_comment(12, "Charts"), "Sub-task: #12 - Charts");
        assert!(status_comment(NodeStatus::OnHold).starts_with("Status updated to: **on-hold**"));
        assert!(close_comment("Shipped").starts_with("Issue closed: Shipped"));
    }

    #[test]
    fn test_failure_maps_to_app_error() {
        let err: AppError = IssueFailure::rejected("Failed to create issue: 422", 422, "{}").into();
        assert!(matches!(
            err,
            AppError::GitHubApi {
                status_code: Some(422),
                ..
            }
        ));

        let err: AppError = IssueFailure::transport("Request timed out").into();
        assert!(matches!(err, AppError::Network { .. }));
    }
}
