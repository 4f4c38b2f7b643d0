//! Release node model.
//!
//! A release owns a forest of nodes (release → feature → task). The nested
//! shape here is the wire and storage format; tree operations go through
//! [`crate::services::node_tree::NodeTree`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of work item a node represents. Purely descriptive, any kind may
/// have children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Release,
    Feature,
    #[default]
    Task,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Release => write!(f, "release"),
            Self::Feature => write!(f, "feature"),
            Self::Task => write!(f, "task"),
        }
    }
}

/// Priority of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// State of an issue on the remote tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Work status of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    #[default]
    Planning,
    InDevelopment,
    Testing,
    ReadyForRelease,
    Released,
    Blocked,
    OnHold,
    Completed,
    Cancelled,
}

impl NodeStatus {
    /// Remote issue state for this status.
    ///
    /// Terminal statuses close the issue, everything else keeps it open.
    pub fn remote_state(self) -> IssueState {
        match self {
            Self::Released | Self::Completed | Self::Cancelled => IssueState::Closed,
            Self::Planning
            | Self::InDevelopment
            | Self::Testing
            | Self::ReadyForRelease
            | Self::Blocked
            | Self::OnHold => IssueState::Open,
        }
    }

    /// Whether the node counts as done for release completion.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Released | Self::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::InDevelopment => "in-development",
            Self::Testing => "testing",
            Self::ReadyForRelease => "ready-for-release",
            Self::Released => "released",
            Self::Blocked => "blocked",
            Self::OnHold => "on-hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::fmt::Display for DeployEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Open attribute bag attached to every node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeProperties {
    pub version: String,
    pub assignee: String,
    pub target_date: String,
    pub environment: DeployEnvironment,
    pub description: String,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub status: NodeStatus,
    pub story_points: String,
    pub dependencies: Vec<String>,
    pub notes: String,
    pub release_notes: String,
}

/// Link between a node and its GitHub issue.
///
/// Set once on the first successful publish. Afterwards only `last_synced`
/// moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubIssueRef {
    pub issue_number: u64,
    pub issue_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

/// A unit of work inside a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseNode {
    /// Caller-assigned id, unique across the release's whole tree.
    pub id: String,

    pub title: String,

    #[serde(rename = "type", default)]
    pub node_type: NodeType,

    /// Display color hint (e.g. `bg-blue-600`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Display icon hint (e.g. `Package`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default)]
    pub properties: NodeProperties,

    #[serde(default)]
    pub children: Vec<ReleaseNode>,

    /// Canvas state: whether the node's children are shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,

    /// Canvas position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_issue: Option<GitHubIssueRef>,
}

impl ReleaseNode {
    /// Create a childless node with default properties.
    pub fn new(id: impl Into<String>, title: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            node_type,
            color: None,
            icon: None,
            properties: NodeProperties::default(),
            children: Vec::new(),
            expanded: None,
            x: None,
            y: None,
            github_issue: None,
        }
    }

    /// Builder-style helper to attach children.
    pub fn with_children(mut self, children: Vec<ReleaseNode>) -> Self {
        self.children = children;
        self
    }
}

/// Partial update of a node's properties. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePropertiesPatch {
    pub version: Option<String>,
    pub assignee: Option<String>,
    pub target_date: Option<String>,
    pub environment: Option<DeployEnvironment>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub status: Option<NodeStatus>,
    pub story_points: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub notes: Option<String>,
    pub release_notes: Option<String>,
}

/// Partial update of a node.
///
/// Never touches `id`, `children` or `github_issue`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodePatch {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub node_type: Option<NodeType>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub expanded: Option<bool>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub properties: Option<NodePropertiesPatch>,
}

impl NodePatch {
    /// Merge the set fields into `node`.
    pub fn apply(&self, node: &mut ReleaseNode) {
        if let Some(title) = &self.title {
            node.title = title.clone();
        }
        if let Some(node_type) = self.node_type {
            node.node_type = node_type;
        }
        if let Some(color) = &self.color {
            node.color = Some(color.clone());
        }
        if let Some(icon) = &self.icon {
            node.icon = Some(icon.clone());
        }
        if self.expanded.is_some() {
            node.expanded = self.expanded;
        }
        if self.x.is_some() {
            node.x = self.x;
        }
        if self.y.is_some() {
            node.y = self.y;
        }
        if let Some(props) = &self.properties {
            props.apply(&mut node.properties);
        }
    }
}

impl NodePropertiesPatch {
    fn apply(&self, props: &mut NodeProperties) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(value) = &self.$field {
                    props.$field = value.clone();
                })*
            };
        }
        merge!(
            version,
            assignee,
            target_date,
            environment,
            description,
            tags,
            priority,
            status,
            story_points,
            dependencies,
            notes,
            release_notes
        );
    }
}
