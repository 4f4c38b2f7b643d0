//! Dashboard aggregates computed from the repository.

use crate::error::AppError;
use crate::models::{Release, ReleaseStatus};
use crate::store::{ReleaseQuery, ReleaseRepository};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_releases: usize,
    pub active_releases: usize,
    /// Mean of release completion, two decimals.
    pub average_completion: f64,
    pub total_environments: usize,
    pub total_teams: usize,
    pub total_workflows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRate {
    pub id: String,
    pub name: String,
    pub completion: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub releases_by_category: BTreeMap<String, usize>,
    pub releases_by_status: BTreeMap<String, usize>,
    pub releases_by_environment: BTreeMap<String, usize>,
    pub completion_rates: Vec<CompletionRate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub status: String,
    pub storage: String,
    pub uptime_secs: i64,
    pub last_check: DateTime<Utc>,
}

async fn all_releases(store: &dyn ReleaseRepository) -> Result<Vec<Release>, AppError> {
    store.list_releases(&ReleaseQuery::default()).await
}

pub async fn stats(store: &dyn ReleaseRepository) -> Result<DashboardStats, AppError> {
    let releases = all_releases(store).await?;

    let average_completion = if releases.is_empty() {
        0.0
    } else {
        let sum: f64 = releases.iter().map(|r| f64::from(r.completion)).sum();
        (sum / releases.len() as f64 * 100.0).round() / 100.0
    };

    Ok(DashboardStats {
        total_releases: releases.len(),
        active_releases: releases
            .iter()
            .filter(|r| r.status == ReleaseStatus::Active)
            .count(),
        average_completion,
        total_environments: store.list_environments().await?.len(),
        total_teams: store.list_teams().await?.len(),
        total_workflows: store.list_workflows().await?.len(),
    })
}

pub async fn metrics(store: &dyn ReleaseRepository) -> Result<DashboardMetrics, AppError> {
    let mut metrics = DashboardMetrics::default();

    for release in all_releases(store).await? {
        *metrics
            .releases_by_category
            .entry(release.category.as_str().to_string())
            .or_default() += 1;
        *metrics
            .releases_by_status
            .entry(release.status.as_str().to_string())
            .or_default() += 1;
        *metrics
            .releases_by_environment
            .entry(release.environment.to_string())
            .or_default() += 1;
        metrics.completion_rates.push(CompletionRate {
            id: release.id,
            name: release.name,
            completion: release.completion,
        });
    }

    Ok(metrics)
}

/// Health snapshot. The repository is probed so a broken database reports
/// `degraded` instead of failing the request.
pub async fn health(store: &dyn ReleaseRepository, started_at: DateTime<Utc>) -> SystemHealth {
    let probe = ReleaseQuery {
        limit: Some(1),
        ..Default::default()
    };
    let status = match store.list_releases(&probe).await {
        Ok(_) => "healthy",
        Err(e) => {
            log::error!("[store] Health probe failed: {}", e);
            "degraded"
        }
    };

    let now = Utc::now();
    SystemHealth {
        status: status.to_string(),
        storage: store.backend_name().to_string(),
        uptime_secs: (now - started_at).num_seconds(),
        last_check: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReleaseCategory, ReleaseDraft};
    use crate::store::{seed, MemoryStore};

    async fn store_with(completions: &[(u8, ReleaseCategory)]) -> MemoryStore {
        let store = MemoryStore::new();
        store.replace_catalog(seed::sample_catalog()).await.unwrap();
        for (i, (completion, category)) in completions.iter().enumerate() {
            let mut release = Release::from_draft(
                ReleaseDraft {
                    id: Some(format!("rel-{}", i)),
                    name: format!("Release {}", i),
                    version: "1.0.0".into(),
                    category: *category,
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
            release.completion = *completion;
            store.insert_release(&release).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_stats_average_completion() {
        let store = store_with(&[
            (10, ReleaseCategory::Major),
            (20, ReleaseCategory::Minor),
            (25, ReleaseCategory::Minor),
        ])
        .await;

        let stats = stats(&store).await.unwrap();
        assert_eq!(stats.total_releases, 3);
        assert_eq!(stats.active_releases, 3);
        assert_eq!(stats.average_completion, 18.33);
        assert_eq!(stats.total_environments, 3);
        assert_eq!(stats.total_teams, 3);
        assert_eq!(stats.total_workflows, 2);
    }

    #[tokio::test]
    async fn test_metrics_group_counts() {
        let store = store_with(&[(0, ReleaseCategory::Minor), (50, ReleaseCategory::Minor)]).await;

        let metrics = metrics(&store).await.unwrap();
        assert_eq!(metrics.releases_by_category.get("minor"), Some(&2));
        assert_eq!(metrics.releases_by_status.get("active"), Some(&2));
        assert_eq!(metrics.releases_by_environment.get("development"), Some(&2));
        assert_eq!(metrics.completion_rates[1].completion, 50);
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let store = MemoryStore::new();
        let health = health(&store, Utc::now()).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.storage, "memory");
        assert!(health.uptime_secs >= 0);
    }
}
