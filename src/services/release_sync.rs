//! Release synchronization with GitHub Issues.
//!
//! The free functions work on a release in memory and never touch storage;
//! [`ReleaseSyncService`] wraps them with load/save against a repository.
//! Remote calls are issued one at a time in tree pre-order.

use crate::error::AppError;
use crate::models::{IssueState, NodeStatus, Release};
use crate::services::issue_tracker::{link_comment, post_comment_best_effort, IssueTracker};
use crate::services::node_tree::NodeTree;
use crate::store::ReleaseRepository;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIssueEntry {
    pub node_id: String,
    pub node_title: String,
    pub issue_number: u64,
    pub issue_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedIssueEntry {
    pub node_id: String,
    pub node_title: String,
    pub issue_number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedIssueEntry {
    pub node_id: String,
    pub node_title: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedIssueEntry {
    pub node_id: String,
    pub issue_number: u64,
}

/// Result of a publish pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub success: bool,
    pub created_issues: Vec<CreatedIssueEntry>,
    pub failed_issues: Vec<FailedIssueEntry>,
    pub skipped_issues: Vec<SkippedIssueEntry>,
    pub total_processed: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSyncReport {
    pub success: bool,
    pub message: String,
    pub issue_number: u64,
    pub new_status: NodeStatus,
    pub remote_state: IssueState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCloseReport {
    pub success: bool,
    pub message: String,
    pub issue_number: u64,
}

/// Result of closing every linked issue of a release.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseReport {
    pub success: bool,
    pub closed_issues: Vec<ClosedIssueEntry>,
    pub failed_issues: Vec<FailedIssueEntry>,
    pub message: String,
}

/// Closing comment used when the caller gives no reason.
pub const DEFAULT_CLOSE_REASON: &str = "Closed from the release board";

/// Create an issue for every node of `release` that has none yet.
///
/// Parents are visited before their children. A child created right after
/// its parent was created in the same pass gets a link comment on the
/// parent issue. A failed node does not stop the walk; its children are
/// still published, without link comments.
pub async fn publish_release(
    tracker: &dyn IssueTracker,
    release: &mut Release,
) -> Result<PublishReport, AppError> {
    let mut tree = NodeTree::from_release(release)?;
    let order: Vec<(String, Option<String>)> = tree
        .preorder()
        .map(|e| (e.node.id.clone(), e.parent_id.map(str::to_owned)))
        .collect();

    let mut report = PublishReport::default();
    let mut created_now: HashMap<String, u64> = HashMap::new();

    for (node_id, parent_id) in order {
        report.total_processed += 1;

        let Some(node) = tree.find(&node_id).cloned() else {
            continue;
        };

        if let Some(issue) = &node.github_issue {
            report.skipped_issues.push(SkippedIssueEntry {
                node_id,
                node_title: node.title,
                issue_number: issue.issue_number,
            });
            continue;
        }

        match tracker.create_issue(&node).await {
            Ok(created) => {
                let issue_number = created.issue_number;
                report.created_issues.push(CreatedIssueEntry {
                    node_id: node_id.clone(),
                    node_title: node.title.clone(),
                    issue_number,
                    issue_url: created.issue_url.clone(),
                });
                tree.link_issue(&node_id, created.into_ref())?;

                if let Some(&parent_issue) = parent_id.as_ref().and_then(|p| created_now.get(p)) {
                    post_comment_best_effort(
                        tracker,
                        parent_issue,
                        &link_comment(issue_number, &node.title),
                    )
                    .await;
                }
                created_now.insert(node_id, issue_number);
            }
            Err(failure) => {
                log::warn!("[sync] Node {} was not published: {}", node_id, failure);
                report.failed_issues.push(FailedIssueEntry {
                    node_id,
                    node_title: node.title,
                    error: failure.message,
                    details: failure.details,
                });
            }
        }
    }

    report.success = report.failed_issues.is_empty();
    report.message = format!(
        "Published {} issues to GitHub",
        report.created_issues.len()
    );

    if !report.created_issues.is_empty() {
        tree.write_back(release);
        release.updated_at = Utc::now();
    }

    Ok(report)
}

/// Push a node's new status to its issue, then record it locally.
///
/// Fails without any remote call when the node is unknown or unpublished.
pub async fn sync_node_status(
    tracker: &dyn IssueTracker,
    release: &mut Release,
    node_id: &str,
    status: NodeStatus,
) -> Result<NodeSyncReport, AppError> {
    let mut tree = NodeTree::from_release(release)?;
    let issue_number = linked_issue(&tree, node_id)?;

    let update = tracker.update_issue_status(issue_number, status).await?;

    let now = Utc::now();
    tree.record_sync(node_id, Some(status), now)?;
    tree.write_back(release);
    release.updated_at = now;

    Ok(NodeSyncReport {
        success: true,
        message: format!("GitHub issue #{} updated", issue_number),
        issue_number,
        new_status: update.new_status,
        remote_state: update.remote_state,
    })
}

/// Close the issue of a single node.
pub async fn close_node_issue(
    tracker: &dyn IssueTracker,
    release: &mut Release,
    node_id: &str,
    reason: Option<&str>,
) -> Result<NodeCloseReport, AppError> {
    let mut tree = NodeTree::from_release(release)?;
    let issue_number = linked_issue(&tree, node_id)?;

    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_CLOSE_REASON);
    tracker.close_issue(issue_number, reason).await?;

    let now = Utc::now();
    tree.record_sync(node_id, None, now)?;
    tree.write_back(release);
    release.updated_at = now;

    Ok(NodeCloseReport {
        success: true,
        message: format!("GitHub issue #{} closed", issue_number),
        issue_number,
    })
}

/// Close the issue of every linked node, continuing past failures.
pub async fn close_all(
    tracker: &dyn IssueTracker,
    release: &mut Release,
) -> Result<CloseReport, AppError> {
    let mut tree = NodeTree::from_release(release)?;
    let linked: Vec<(String, String, u64)> = tree
        .preorder()
        .filter_map(|e| {
            e.node
                .github_issue
                .as_ref()
                .map(|issue| (e.node.id.clone(), e.node.title.clone(), issue.issue_number))
        })
        .collect();

    let mut report = CloseReport::default();
    let now = Utc::now();

    for (node_id, node_title, issue_number) in linked {
        match tracker
            .update_issue_status(issue_number, NodeStatus::Released)
            .await
        {
            Ok(_) => {
                tree.record_sync(&node_id, None, now)?;
                report.closed_issues.push(ClosedIssueEntry {
                    node_id,
                    issue_number,
                });
            }
            Err(failure) => {
                log::warn!(
                    "[sync] Issue #{} of node {} was not closed: {}",
                    issue_number,
                    node_id,
                    failure
                );
                report.failed_issues.push(FailedIssueEntry {
                    node_id,
                    node_title,
                    error: failure.message,
                    details: failure.details,
                });
            }
        }
    }

    report.success = report.failed_issues.is_empty();
    report.message = format!("Closed {} GitHub issues", report.closed_issues.len());

    if !report.closed_issues.is_empty() {
        tree.write_back(release);
        release.updated_at = now;
    }

    Ok(report)
}

fn linked_issue(tree: &NodeTree, node_id: &str) -> Result<u64, AppError> {
    let node = tree
        .find(node_id)
        .ok_or_else(|| AppError::not_found_with_id("ReleaseNode", node_id))?;
    node.github_issue
        .as_ref()
        .map(|issue| issue.issue_number)
        .ok_or_else(|| AppError::not_published(node_id))
}

/// Runs the sync operations against stored releases.
#[derive(Clone)]
pub struct ReleaseSyncService {
    store: Arc<dyn ReleaseRepository>,
    tracker: Arc<dyn IssueTracker>,
}

impl ReleaseSyncService {
    pub fn new(store: Arc<dyn ReleaseRepository>, tracker: Arc<dyn IssueTracker>) -> Self {
        Self { store, tracker }
    }

    pub async fn publish(&self, release_id: &str) -> Result<PublishReport, AppError> {
        let mut release = self.store.require_release(release_id).await?;
        log::info!(
            "[sync] Publishing release {} ({} nodes)",
            release_id,
            release.node_count
        );

        let report = publish_release(self.tracker.as_ref(), &mut release).await?;
        if !report.created_issues.is_empty() {
            self.store.save_release(&release).await?;
        }

        log::info!(
            "[sync] Release {}: {} created, {} failed, {} skipped",
            release_id,
            report.created_issues.len(),
            report.failed_issues.len(),
            report.skipped_issues.len()
        );
        Ok(report)
    }

    pub async fn sync_node_status(
        &self,
        release_id: &str,
        node_id: &str,
        status: NodeStatus,
    ) -> Result<NodeSyncReport, AppError> {
        let mut release = self.store.require_release(release_id).await?;
        let report = sync_node_status(self.tracker.as_ref(), &mut release, node_id, status).await?;
        self.store.save_release(&release).await?;
        Ok(report)
    }

    pub async fn close_node_issue(
        &self,
        release_id: &str,
        node_id: &str,
        reason: Option<&str>,
    ) -> Result<NodeCloseReport, AppError> {
        let mut release = self.store.require_release(release_id).await?;
        let report = close_node_issue(self.tracker.as_ref(), &mut release, node_id, reason).await?;
        self.store.save_release(&release).await?;
        Ok(report)
    }

    pub async fn close_all(&self, release_id: &str) -> Result<CloseReport, AppError> {
        let mut release = self.store.require_release(release_id).await?;
        let report = close_all(self.tracker.as_ref(), &mut release).await?;
        if !report.closed_issues.is_empty() {
            self.store.save_release(&release).await?;
        }
        log::info!(
            "[sync] Release {}: closed {} issues, {} failures",
            release_id,
            report.closed_issues.len(),
            report.failed_issues.len()
        );
        Ok(report)
    }
}
