//! Data models for the application.
//!
//! These models represent the entities kept by the release repository and
//! exchanged as JSON over the HTTP API.
//!
//! All models derive Serialize/Deserialize; the SQLite repository stores
//! them as JSON documents.

pub mod environment;
pub mod node;
pub mod release;
pub mod team;
pub mod workflow;

// Re-exports for convenient access
pub use environment::Environment;
pub use node::{
    DeployEnvironment, GitHubIssueRef, IssueState, NodePatch, NodeProperties,
    NodePropertiesPatch, NodeStatus, NodeType, Priority, ReleaseNode,
};
pub use release::{
    LifecycleAction, Release, ReleaseCategory, ReleaseDraft, ReleasePreview, ReleaseStatus,
    ReleaseUpdate, StatusHistoryEntry, TransitionRequest,
};
pub use team::Team;
pub use workflow::Workflow;
