//! In-memory repository.
//!
//! Data lives for the lifetime of the process. Releases are kept in a
//! `HashMap` keyed by id behind a `tokio::sync::RwLock`.

use super::{Catalog, ReleaseQuery, ReleaseRepository};
use crate::error::AppError;
use crate::models::{Environment, Release, Team, Workflow};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    releases: HashMap<String, Release>,
    catalog: Catalog,
}

/// Process-local release storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReleaseRepository for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn list_releases(&self, query: &ReleaseQuery) -> Result<Vec<Release>, AppError> {
        let inner = self.inner.read().await;

        let mut matching: Vec<&Release> = inner
            .releases
            .values()
            .filter(|r| query.matches(r))
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(query.skip)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get_release(&self, id: &str) -> Result<Option<Release>, AppError> {
        Ok(self.inner.read().await.releases.get(id).cloned())
    }

    async fn insert_release(&self, release: &Release) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.releases.contains_key(&release.id) {
            return Err(AppError::conflict(format!(
                "Release {} already exists",
                release.id
            )));
        }
        inner.releases.insert(release.id.clone(), release.clone());
        Ok(())
    }

    async fn save_release(&self, release: &Release) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        match inner.releases.get_mut(&release.id) {
            Some(existing) => {
                *existing = release.clone();
                Ok(())
            }
            None => Err(AppError::not_found_with_id("Release", &release.id)),
        }
    }

    async fn delete_release(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.inner.write().await.releases.remove(id).is_some())
    }

    async fn list_environments(&self) -> Result<Vec<Environment>, AppError> {
        Ok(self.inner.read().await.catalog.environments.clone())
    }

    async fn list_teams(&self) -> Result<Vec<Team>, AppError> {
        Ok(self.inner.read().await.catalog.teams.clone())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, AppError> {
        Ok(self.inner.read().await.catalog.workflows.clone())
    }

    async fn replace_catalog(&self, catalog: Catalog) -> Result<(), AppError> {
        self.inner.write().await.catalog = catalog;
        Ok(())
    }
}
