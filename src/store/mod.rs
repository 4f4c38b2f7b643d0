//! Release repository.
//!
//! Releases and the catalog (environments, teams, workflows) live behind
//! [`ReleaseRepository`]. Two backends exist: [`memory::MemoryStore`] for
//! ephemeral runs and tests, and [`sqlite::SqliteStore`] which keeps each
//! release as a JSON document.

pub mod memory;
pub mod seed;
pub mod sqlite;

use crate::error::AppError;
use crate::models::{Environment, Release, ReleaseCategory, ReleaseStatus, Team, Workflow};
use async_trait::async_trait;
use serde::Deserialize;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Largest page a listing may request.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Page size used when a listing does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Filters and paging for [`ReleaseRepository::list_releases`].
///
/// `limit: None` returns every matching release.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReleaseQuery {
    pub skip: usize,
    pub limit: Option<usize>,
    pub status: Option<ReleaseStatus>,
    pub category: Option<ReleaseCategory>,
    /// Case-insensitive substring of name, version or description.
    pub search: Option<String>,
}

impl ReleaseQuery {
    /// Check paging bounds.
    pub fn validate(&self) -> Result<(), AppError> {
        match self.limit {
            Some(limit) if limit == 0 || limit > MAX_PAGE_SIZE => Err(
                AppError::invalid_input_field(
                    format!("limit must be between 1 and {}", MAX_PAGE_SIZE),
                    "limit",
                ),
            ),
            _ => Ok(()),
        }
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Whether `release` passes the filters (paging aside).
    pub fn matches(&self, release: &Release) -> bool {
        if self.status.is_some_and(|s| s != release.status) {
            return false;
        }
        if self.category.is_some_and(|c| c != release.category) {
            return false;
        }
        match self.search_term() {
            Some(term) => [&release.name, &release.version, &release.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&term)),
            None => true,
        }
    }
}

/// Catalog records, replaced as a whole when seeding.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub environments: Vec<Environment>,
    pub teams: Vec<Team>,
    pub workflows: Vec<Workflow>,
}

/// Storage for releases and the catalog.
///
/// Listings are ordered by `created_at`, then `id`.
#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    /// Short backend name reported by the health endpoint.
    fn backend_name(&self) -> &'static str;

    async fn list_releases(&self, query: &ReleaseQuery) -> Result<Vec<Release>, AppError>;

    async fn get_release(&self, id: &str) -> Result<Option<Release>, AppError>;

    /// Store a new release. Fails with a conflict if the id is taken.
    async fn insert_release(&self, release: &Release) -> Result<(), AppError>;

    /// Overwrite an existing release. Fails with not-found if it is absent.
    async fn save_release(&self, release: &Release) -> Result<(), AppError>;

    /// Returns false if there was nothing to delete.
    async fn delete_release(&self, id: &str) -> Result<bool, AppError>;

    async fn list_environments(&self) -> Result<Vec<Environment>, AppError>;

    async fn list_teams(&self) -> Result<Vec<Team>, AppError>;

    async fn list_workflows(&self) -> Result<Vec<Workflow>, AppError>;

    async fn replace_catalog(&self, catalog: Catalog) -> Result<(), AppError>;

    async fn get_team(&self, id: &str) -> Result<Option<Team>, AppError> {
        Ok(self.list_teams().await?.into_iter().find(|t| t.id == id))
    }

    /// Release held resources before shutdown. The default does nothing.
    async fn close(&self) {}

    /// Fetch a release or fail with not-found.
    async fn require_release(&self, id: &str) -> Result<Release, AppError> {
        self.get_release(id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("Release", id))
    }
}
