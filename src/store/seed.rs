//! Sample data for a fresh store.

use super::{Catalog, ReleaseQuery, ReleaseRepository};
use crate::error::AppError;
use crate::models::{
    DeployEnvironment, Environment, NodeStatus, NodeType, Priority, Release, ReleaseCategory,
    ReleaseDraft, ReleaseNode, ReleasePreview, Team, Workflow,
};
use crate::services::node_tree::NodeTree;
use chrono::{DateTime, Utc};

fn node(
    id: &str,
    title: &str,
    node_type: NodeType,
    color: &str,
    icon: &str,
    configure: impl FnOnce(&mut ReleaseNode),
) -> ReleaseNode {
    let mut node = ReleaseNode::new(id, title, node_type);
    node.color = Some(color.to_string());
    node.icon = Some(icon.to_string());
    configure(&mut node);
    node
}

/// The "Q1 2024 Major Release" sample with one release node and two features.
pub fn sample_release(now: DateTime<Utc>) -> Result<Release, AppError> {
    let dashboard = node("node-2", "User Dashboard", NodeType::Feature, "bg-blue-600", "Layout", |n| {
        n.properties.description = "New user dashboard with analytics".into();
        n.properties.assignee = "John Doe".into();
        n.properties.status = NodeStatus::Testing;
    });
    let api = node("node-3", "API Integration", NodeType::Feature, "bg-green-600", "Link", |n| {
        n.properties.description = "Third-party API integrations".into();
        n.properties.assignee = "Jane Smith".into();
    });
    let root = node("node-1", "Q1 2024 Release", NodeType::Release, "bg-purple-600", "Rocket", |n| {
        n.properties.version = "2.0.0".into();
        n.properties.description = "Major platform release".into();
        n.properties.priority = Priority::High;
        n.properties.status = NodeStatus::InDevelopment;
    })
    .with_children(vec![dashboard, api]);

    let mut release = Release::from_draft(
        ReleaseDraft {
            id: None,
            name: "Q1 2024 Major Release".into(),
            version: "2.0.0".into(),
            description: "Major platform upgrade with new features".into(),
            category: ReleaseCategory::Major,
            tags: vec!["platform".into(), "upgrade".into()],
            target_date: "2024-03-31".into(),
            environment: DeployEnvironment::Production,
            preview: Some(ReleasePreview {
                central_node: "node-1".into(),
                branches: vec!["node-2".into(), "node-3".into()],
            }),
            nodes: vec![root],
        },
        now,
    )?;

    NodeTree::from_release(&release)?.write_back(&mut release);
    Ok(release)
}

fn environment(
    id: &str,
    name: &str,
    env_type: DeployEnvironment,
    host: &str,
    api_host: &str,
    approvers: &[&str],
) -> Environment {
    let mut config = serde_json::Map::new();
    config.insert(
        "apiUrl".to_string(),
        serde_json::Value::String(format!("https://{}", api_host)),
    );
    Environment {
        id: id.to_string(),
        name: name.to_string(),
        env_type,
        url: format!("https://{}", host),
        description: format!("{} environment", name),
        requires_approval: !approvers.is_empty(),
        approvers: approvers.iter().map(|a| a.to_string()).collect(),
        health_check_url: Some(format!("https://{}/health", host)),
        config,
        status: "healthy".to_string(),
    }
}

fn team(id: &str, name: &str, description: &str, members: [&str; 2]) -> Team {
    Team {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
        lead: Some(members[0].to_string()),
    }
}

fn workflow(id: &str, name: &str, description: &str, steps: [&str; 4], triggers: &[&str]) -> Workflow {
    Workflow {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        triggers: triggers.iter().map(|t| t.to_string()).collect(),
        is_active: true,
    }
}

/// Environments, teams and workflows shipped with a fresh store.
pub fn sample_catalog() -> Catalog {
    Catalog {
        environments: vec![
            environment(
                "env-dev",
                "Development",
                DeployEnvironment::Development,
                "dev.example.com",
                "api-dev.example.com",
                &[],
            ),
            environment(
                "env-staging",
                "Staging",
                DeployEnvironment::Staging,
                "staging.example.com",
                "api-staging.example.com",
                &["user-1", "user-2"],
            ),
            environment(
                "env-prod",
                "Production",
                DeployEnvironment::Production,
                "www.example.com",
                "api.example.com",
                &["user-1", "user-2", "user-3"],
            ),
        ],
        teams: vec![
            team("team-1", "Platform Team", "Core platform services", ["John Doe", "Jane Smith"]),
            team("team-2", "Mobile Team", "iOS and Android apps", ["Bob Johnson", "Alice Brown"]),
            team("team-3", "DevOps Team", "Build, deploy and operations", ["Charlie Wilson", "Diana Prince"]),
        ],
        workflows: vec![
            workflow(
                "workflow-1",
                "Standard Deployment",
                "Standard deployment workflow",
                ["Build", "Test", "Deploy", "Verify"],
                &["release-approved"],
            ),
            workflow(
                "workflow-2",
                "Hotfix Deployment",
                "Emergency hotfix workflow",
                ["Build", "Quick Test", "Deploy", "Monitor"],
                &["hotfix-created"],
            ),
        ],
    }
}

/// Load the sample data into an empty store.
///
/// Releases and the catalog are checked separately, so a store that only
/// lost one of them gets that part back.
pub async fn seed_if_empty(store: &dyn ReleaseRepository) -> Result<(), AppError> {
    let probe = ReleaseQuery {
        limit: Some(1),
        ..Default::default()
    };
    if store.list_releases(&probe).await?.is_empty() {
        let release = sample_release(Utc::now())?;
        log::info!("[store] Seeding sample release '{}'", release.name);
        store.insert_release(&release).await?;
    }

    if store.list_environments().await?.is_empty() {
        log::info!("[store] Seeding sample environments, teams and workflows");
        store.replace_catalog(sample_catalog()).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_sample_release_has_derived_fields() {
        let release = sample_release(Utc::now()).unwrap();
        assert_eq!(release.node_count, 3);
        assert_eq!(release.completion, 0);
        assert_eq!(release.nodes[0].children.len(), 2);
    }

    #[test]
    fn test_sample_catalog_contents() {
        let catalog = sample_catalog();
        assert_eq!(catalog.environments.len(), 3);
        assert!(!catalog.environments[0].requires_approval);
        assert_eq!(catalog.environments[2].approvers.len(), 3);
        assert_eq!(catalog.teams[1].lead.as_deref(), Some("Bob Johnson"));
        assert_eq!(catalog.workflows[1].steps[1], "Quick Test");
    }

    #[tokio::test]
    async fn test_seed_only_fills_empty_store() {
        let store = MemoryStore::new();
        seed_if_empty(&store).await.unwrap();
        seed_if_empty(&store).await.unwrap();

        let releases = store.list_releases(&ReleaseQuery::default()).await.unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(store.list_teams().await.unwrap().len(), 3);
        assert_eq!(store.list_workflows().await.unwrap().len(), 2);
    }
}
