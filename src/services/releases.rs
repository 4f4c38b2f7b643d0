//! Release CRUD, lifecycle transitions and node editing.
//!
//! Every write goes through [`NodeTree`] so node ids are validated and the
//! derived `nodeCount`/`completion` fields stay current.

use crate::error::AppError;
use crate::models::{
    LifecycleAction, NodePatch, Release, ReleaseDraft, ReleaseNode, ReleaseUpdate,
    StatusHistoryEntry, TransitionRequest,
};
use crate::services::node_tree::NodeTree;
use crate::store::{ReleaseQuery, ReleaseRepository, DEFAULT_PAGE_SIZE};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

/// Largest `limit` accepted by [`ReleaseService::history`].
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Body of a node insert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertNodeRequest {
    /// Parent node id; `None` adds a new root.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub node: ReleaseNode,
}

/// Body of a node move.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoveNodeRequest {
    pub parent_id: Option<String>,
    pub position: Option<usize>,
}

#[derive(Clone)]
pub struct ReleaseService {
    store: Arc<dyn ReleaseRepository>,
}

fn node_not_found(node_id: &str) -> AppError {
    AppError::not_found_with_id("ReleaseNode", node_id)
}

impl ReleaseService {
    pub fn new(store: Arc<dyn ReleaseRepository>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ReleaseRepository> {
        &self.store
    }

    /// List releases; a query without a limit gets the default page size.
    pub async fn list(&self, mut query: ReleaseQuery) -> Result<Vec<Release>, AppError> {
        query.limit.get_or_insert(DEFAULT_PAGE_SIZE);
        query.validate()?;
        self.store.list_releases(&query).await
    }

    pub async fn get(&self, id: &str) -> Result<Release, AppError> {
        self.store.require_release(id).await
    }

    pub async fn create(&self, draft: ReleaseDraft) -> Result<Release, AppError> {
        let mut release = Release::from_draft(draft, Utc::now())?;
        let mut tree = NodeTree::from_release(&release)?;
        tree.keep_issue_links(&NodeTree::new());
        tree.write_back(&mut release);

        self.store.insert_release(&release).await?;
        log::info!(
            "[server] Created release {} ({} {})",
            release.id,
            release.name,
            release.version
        );
        Ok(release)
    }

    /// Apply a partial update. A `nodes` field replaces the whole forest;
    /// issue links are taken from the stored nodes, never from the body.
    pub async fn update(&self, id: &str, update: ReleaseUpdate) -> Result<Release, AppError> {
        let mut release = self.store.require_release(id).await?;
        release.apply_update(&update)?;
        if let Some(nodes) = update.nodes {
            let stored = NodeTree::from_release(&release)?;
            let mut tree = NodeTree::from_forest(nodes)?;
            tree.keep_issue_links(&stored);
            tree.write_back(&mut release);
        }
        release.updated_at = Utc::now();

        self.store.save_release(&release).await?;
        Ok(release)
    }

    /// Delete a release. Linked GitHub issues are left alone.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        if !self.store.delete_release(id).await? {
            return Err(AppError::not_found_with_id("Release", id));
        }
        log::info!("[server] Deleted release {}", id);
        Ok(())
    }

    pub async fn transition(
        &self,
        id: &str,
        action: LifecycleAction,
        request: &TransitionRequest,
    ) -> Result<Release, AppError> {
        let mut release = self.store.require_release(id).await?;
        let now = Utc::now();
        let entry = release.transition(action, request, now)?;
        release.updated_at = now;

        self.store.save_release(&release).await?;
        log::info!(
            "[server] Release {} {}: {} -> {}",
            id,
            entry.action,
            entry.previous_status,
            entry.new_status
        );
        Ok(release)
    }

    /// Status history, oldest first. `limit` keeps only the most recent
    /// entries and must be between 1 and [`MAX_HISTORY_LIMIT`].
    pub async fn history(
        &self,
        id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StatusHistoryEntry>, AppError> {
        if let Some(limit) = limit {
            if limit == 0 || limit > MAX_HISTORY_LIMIT {
                return Err(AppError::invalid_input_field(
                    format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT),
                    "limit",
                ));
            }
        }
        let mut history = self.store.require_release(id).await?.status_history;
        if let Some(limit) = limit {
            let skip = history.len().saturating_sub(limit);
            history.drain(..skip);
        }
        Ok(history)
    }

    /// A node with its subtree.
    pub async fn find_node(&self, id: &str, node_id: &str) -> Result<ReleaseNode, AppError> {
        let release = self.store.require_release(id).await?;
        NodeTree::from_release(&release)?
            .subtree(node_id)
            .ok_or_else(|| node_not_found(node_id))
    }

    pub async fn insert_node(
        &self,
        id: &str,
        request: InsertNodeRequest,
    ) -> Result<ReleaseNode, AppError> {
        let node_id = request.node.id.clone();
        self.edit_tree(id, |tree| {
            tree.insert(request.parent_id.as_deref(), request.node)
        })
        .await?
        .subtree(&node_id)
        .ok_or_else(|| node_not_found(&node_id))
    }

    pub async fn update_node(
        &self,
        id: &str,
        node_id: &str,
        patch: &NodePatch,
    ) -> Result<ReleaseNode, AppError> {
        self.edit_tree(id, |tree| {
            if tree.update(node_id, patch) {
                Ok(())
            } else {
                Err(node_not_found(node_id))
            }
        })
        .await?
        .subtree(node_id)
        .ok_or_else(|| node_not_found(node_id))
    }

    pub async fn move_node(
        &self,
        id: &str,
        node_id: &str,
        request: &MoveNodeRequest,
    ) -> Result<ReleaseNode, AppError> {
        self.edit_tree(id, |tree| {
            tree.move_node(node_id, request.parent_id.as_deref(), request.position)
        })
        .await?
        .subtree(node_id)
        .ok_or_else(|| node_not_found(node_id))
    }

    /// Remove a node and its subtree, returning what was removed.
    pub async fn remove_node(&self, id: &str, node_id: &str) -> Result<ReleaseNode, AppError> {
        let mut removed = None;
        self.edit_tree(id, |tree| {
            removed = tree.remove(node_id);
            if removed.is_some() {
                Ok(())
            } else {
                Err(node_not_found(node_id))
            }
        })
        .await?;
        removed.ok_or_else(|| node_not_found(node_id))
    }

    /// Load a release, run `edit` on its tree, and save it.
    ///
    /// Returns the tree as saved so callers can read back the result.
    async fn edit_tree<F>(&self, id: &str, edit: F) -> Result<NodeTree, AppError>
    where
        F: FnOnce(&mut NodeTree) -> Result<(), AppError>,
    {
        let mut release = self.store.require_release(id).await?;
        let mut tree = NodeTree::from_release(&release)?;
        edit(&mut tree)?;

        tree.clone().write_back(&mut release);
        release.updated_at = Utc::now();
        self.store.save_release(&release).await?;
        Ok(tree)
    }
}
