//! Business logic services.
//!
//! This module contains the release tree operations, the GitHub Issues
//! synchronization and the HTTP surface that exposes them.
//!
//! Services take a [`crate::store::ReleaseRepository`] and an
//! [`issue_tracker::IssueTracker`] as trait objects so they can be tested
//! against in-memory fakes.

pub mod api;
pub mod dashboard;
pub mod github_client;
pub mod issue_tracker;
pub mod node_tree;
pub mod release_sync;
pub mod releases;
pub mod server;

pub use github_client::GitHubClient;
pub use node_tree::NodeTree;
pub use release_sync::ReleaseSyncService;
pub use releases::ReleaseService;
