//! Release aggregate and its lifecycle.

use crate::error::AppError;
use crate::models::node::{DeployEnvironment, ReleaseNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    #[default]
    Active,
    Closed,
    Approved,
    Rejected,
    Deploying,
    RolledBack,
}

impl ReleaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Deploying => "deploying",
            Self::RolledBack => "rolled-back",
        }
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseCategory {
    Major,
    #[default]
    Minor,
    Patch,
    Hotfix,
    Beta,
}

impl ReleaseCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::Hotfix => "hotfix",
            Self::Beta => "beta",
        }
    }
}

impl std::fmt::Display for ReleaseCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status transition requested on a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleAction {
    #[serde(rename = "closed")]
    Close,
    #[serde(rename = "reopened")]
    Reopen,
    #[serde(rename = "approved")]
    Approve,
    #[serde(rename = "rejected")]
    Reject,
    #[serde(rename = "deployed")]
    Deploy,
    #[serde(rename = "rolled-back")]
    Rollback,
}

impl LifecycleAction {
    /// Status the release ends up in after this action.
    pub fn target_status(self) -> ReleaseStatus {
        match self {
            Self::Close => ReleaseStatus::Closed,
            Self::Reopen => ReleaseStatus::Active,
            Self::Approve => ReleaseStatus::Approved,
            Self::Reject => ReleaseStatus::Rejected,
            Self::Deploy => ReleaseStatus::Deploying,
            Self::Rollback => ReleaseStatus::RolledBack,
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Close => write!(f, "close"),
            Self::Reopen => write!(f, "reopen"),
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Deploy => write!(f, "deploy"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// One record of the append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub action: LifecycleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub previous_status: ReleaseStatus,
    pub new_status: ReleaseStatus,
}

/// Which nodes the portal shows in its release preview.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleasePreview {
    pub central_node: String,
    pub branches: Vec<String>,
}

/// Release aggregate: metadata, lifecycle state and the node forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: ReleaseCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub target_date: String,
    #[serde(default)]
    pub environment: DeployEnvironment,
    #[serde(default)]
    pub status: ReleaseStatus,
    #[serde(default)]
    pub is_reopened: bool,
    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of nodes in the forest, refreshed on every write.
    #[serde(default)]
    pub node_count: usize,
    /// Percentage of nodes that are released or completed.
    #[serde(default)]
    pub completion: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<ReleasePreview>,
    #[serde(default)]
    pub nodes: Vec<ReleaseNode>,
}

/// Body of `POST /releases`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseDraft {
    /// Optional caller-chosen id; a UUID is generated otherwise.
    pub id: Option<String>,
    pub name: String,
    pub version: String,
    pub description: String,
    pub category: ReleaseCategory,
    pub tags: Vec<String>,
    pub target_date: String,
    pub environment: DeployEnvironment,
    pub preview: Option<ReleasePreview>,
    pub nodes: Vec<ReleaseNode>,
}

/// Body of `PUT /releases/{id}`.
///
/// Status, history and derived fields are not part of it: they only change
/// through lifecycle transitions and node operations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseUpdate {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub category: Option<ReleaseCategory>,
    pub tags: Option<Vec<String>>,
    pub target_date: Option<String>,
    pub environment: Option<DeployEnvironment>,
    pub preview: Option<ReleasePreview>,
    pub nodes: Option<Vec<ReleaseNode>>,
}

/// Body of the lifecycle endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransitionRequest {
    pub reason: Option<String>,
    pub user: Option<String>,
    /// Deploy target environment id.
    pub environment_id: Option<String>,
    /// Rollback target version.
    pub target_version: Option<String>,
}

fn require_non_empty(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_input_field(
            format!("{} must not be empty", field),
            field,
        ));
    }
    Ok(())
}

impl Release {
    /// Build a new active release from a draft.
    ///
    /// Node validation is the caller's job (see `NodeTree::from_forest`).
    pub fn from_draft(draft: ReleaseDraft, now: DateTime<Utc>) -> Result<Self, AppError> {
        require_non_empty(&draft.name, "name")?;
        require_non_empty(&draft.version, "version")?;

        let id = match draft.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };

        Ok(Self {
            id,
            name: draft.name,
            version: draft.version,
            description: draft.description,
            category: draft.category,
            tags: draft.tags,
            target_date: draft.target_date,
            environment: draft.environment,
            status: ReleaseStatus::Active,
            is_reopened: false,
            status_history: Vec::new(),
            created_at: now,
            updated_at: now,
            node_count: 0,
            completion: 0,
            preview: draft.preview,
            nodes: draft.nodes,
        })
    }

    /// Apply the metadata fields of an update. Nodes are handled by the caller.
    pub fn apply_update(&mut self, update: &ReleaseUpdate) -> Result<(), AppError> {
        if let Some(name) = &update.name {
            require_non_empty(name, "name")?;
            self.name = name.clone();
        }
        if let Some(version) = &update.version {
            require_non_empty(version, "version")?;
            self.version = version.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(tags) = &update.tags {
            self.tags = tags.clone();
        }
        if let Some(target_date) = &update.target_date {
            self.target_date = target_date.clone();
        }
        if let Some(environment) = update.environment {
            self.environment = environment;
        }
        if let Some(preview) = &update.preview {
            self.preview = Some(preview.clone());
        }
        Ok(())
    }

    /// Perform a lifecycle transition, appending exactly one history entry.
    pub fn transition(
        &mut self,
        action: LifecycleAction,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<StatusHistoryEntry, AppError> {
        let previous = self.status;

        match action {
            LifecycleAction::Reopen if previous != ReleaseStatus::Closed => {
                return Err(AppError::conflict(format!(
                    "Only closed releases can be reopened (status is {})",
                    previous
                )));
            }
            LifecycleAction::Close if previous == ReleaseStatus::Closed => {
                return Err(AppError::conflict("Release is already closed"));
            }
            LifecycleAction::Reopen | LifecycleAction::Close => {}
            _ if previous == ReleaseStatus::Closed => {
                return Err(AppError::conflict(format!(
                    "Cannot {} a closed release; reopen it first",
                    action
                )));
            }
            _ => {}
        }

        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_owned);

        let reason = match action {
            LifecycleAction::Reject => Some(reason.ok_or_else(|| {
                AppError::invalid_input_field("A rejection reason is required", "reason")
            })?),
            LifecycleAction::Deploy => {
                let env = request
                    .environment_id
                    .as_deref()
                    .filter(|e| !e.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::invalid_input_field(
                            "Deploy requires a target environment",
                            "environmentId",
                        )
                    })?;
                Some(match reason {
                    Some(r) => format!("{} (environment: {})", r, env),
                    None => format!("Deploying to {}", env),
                })
            }
            LifecycleAction::Rollback => match (&reason, request.target_version.as_deref()) {
                (Some(r), Some(v)) => Some(format!("{} (target version: {})", r, v)),
                (None, Some(v)) => Some(format!("Rolling back to {}", v)),
                _ => reason,
            },
            _ => reason,
        };

        let new_status = action.target_status();
        self.status = new_status;
        if action == LifecycleAction::Reopen {
            self.is_reopened = true;
        }
        self.updated_at = now;

        let entry = StatusHistoryEntry {
            action,
            reason,
            timestamp: now,
            user: request.user.clone().unwrap_or_else(|| "system".to_string()),
            previous_status: previous,
            new_status,
        };
        self.status_history.push(entry.clone());
        Ok(entry)
    }
}
