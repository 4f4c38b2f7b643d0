//! Repository behavior shared by both storage backends.
//!
//! The same scenario runs against the in-memory store and a SQLite file in a
//! temporary directory. The SQLite run also reopens the file to check that
//! releases survive a restart.

use ops_portal_lib::error::AppError;
use ops_portal_lib::models::{
    LifecycleAction, NodeType, Release, ReleaseCategory, ReleaseDraft, ReleaseNode,
    ReleaseStatus, TransitionRequest,
};
use ops_portal_lib::store::{seed, MemoryStore, ReleaseQuery, ReleaseRepository, SqliteStore};
use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

fn release(id: &str, name: &str, category: ReleaseCategory, minutes: i64) -> Release {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes);
    Release::from_draft(
        ReleaseDraft {
            id: Some(id.into()),
            name: name.into(),
            version: "1.0.0".into(),
            description: format!("{} release", name),
            category,
            nodes: vec![ReleaseNode::new(format!("{}-root", id), name, NodeType::Release)],
            ..Default::default()
        },
        created,
    )
    .unwrap()
}

async fn exercise(store: &dyn ReleaseRepository) {
    store
        .insert_release(&release("b", "Billing", ReleaseCategory::Minor, 2))
        .await
        .unwrap();
    store
        .insert_release(&release("a", "Analytics", ReleaseCategory::Major, 1))
        .await
        .unwrap();
    store
        .insert_release(&release("c", "Checkout_v2", ReleaseCategory::Minor, 3))
        .await
        .unwrap();

    // Duplicate ids are rejected.
    let err = store
        .insert_release(&release("a", "Again", ReleaseCategory::Patch, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    // Oldest first.
    let ids: Vec<String> = store
        .list_releases(&ReleaseQuery::default())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let page = store
        .list_releases(&ReleaseQuery {
            skip: 1,
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "b");

    let minor = store
        .list_releases(&ReleaseQuery {
            category: Some(ReleaseCategory::Minor),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(minor.len(), 2);

    // Search is case-insensitive and treats `_` literally.
    let found = store
        .list_releases(&ReleaseQuery {
            search: Some("checkout_".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "c");
    let none = store
        .list_releases(&ReleaseQuery {
            search: Some("Checkout%".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());

    // Non-ASCII text folds case the same way on every backend.
    store
        .insert_release(&release("d", "ÉCLAIR Launch", ReleaseCategory::Patch, 4))
        .await
        .unwrap();
    let found = store
        .list_releases(&ReleaseQuery {
            search: Some("éclair".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "d");
    assert!(store.delete_release("d").await.unwrap());

    // Save replaces the stored document.
    let mut billing = store.get_release("b").await.unwrap().unwrap();
    billing
        .transition(
            LifecycleAction::Close,
            &TransitionRequest::default(),
            Utc::now(),
        )
        .unwrap();
    store.save_release(&billing).await.unwrap();

    let closed = store
        .list_releases(&ReleaseQuery {
            status: Some(ReleaseStatus::Closed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status_history.len(), 1);

    let ghost = release("ghost", "Ghost", ReleaseCategory::Patch, 0);
    assert!(store.save_release(&ghost).await.unwrap_err().is_not_found());

    assert!(store.delete_release("a").await.unwrap());
    assert!(!store.delete_release("a").await.unwrap());
    assert!(store.get_release("a").await.unwrap().is_none());

    // Catalog
    store.replace_catalog(seed::sample_catalog()).await.unwrap();
    assert_eq!(store.list_environments().await.unwrap().len(), 3);
    let teams = store.list_teams().await.unwrap();
    let team = store.get_team(&teams[0].id).await.unwrap().unwrap();
    assert_eq!(team, teams[0]);
    assert!(store.get_team("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_store_behavior() {
    let store = MemoryStore::new();
    exercise(&store).await;
    assert_eq!(store.backend_name(), "memory");
}

#[tokio::test]
async fn test_sqlite_store_behavior_and_persistence() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nested").join("releases.db");

    {
        let store = SqliteStore::open(&db_path).await.unwrap();
        exercise(&store).await;
        assert_eq!(store.backend_name(), "sqlite");
        store.close().await;
    }

    let reopened = SqliteStore::open(&db_path).await.unwrap();
    let ids: Vec<String> = reopened
        .list_releases(&ReleaseQuery::default())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["b", "c"]);

    let billing = reopened.get_release("b").await.unwrap().unwrap();
    assert_eq!(billing.status, ReleaseStatus::Closed);
    assert_eq!(billing.nodes[0].id, "b-root");
    assert_eq!(reopened.list_workflows().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_seed_only_fills_empty_store() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("seed.db")).await.unwrap();

    seed::seed_if_empty(&store).await.unwrap();
    seed::seed_if_empty(&store).await.unwrap();

    let releases = store.list_releases(&ReleaseQuery::default()).await.unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].name, "Q1 2024 Major Release");
    assert_eq!(store.list_teams().await.unwrap().len(), 3);
}
