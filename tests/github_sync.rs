//! GitHub synchronization against a fake GitHub REST API.
//!
//! A small axum app on 127.0.0.1 stands in for api.github.com and records
//! every call, so the real `GitHubClient` and `ReleaseSyncService` are
//! exercised end to end:
//! - publishing walks the tree parent-first and links children to parents
//! - a rejected create is reported and does not stop the walk
//! - status sync, single close and close-all update the remote issues
//! - rejected comments never fail the operation that posted them
//! - transport failures surface as network errors

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{patch, post};
use axum::{Json, Router};
use ops_portal_lib::error::AppError;
use ops_portal_lib::models::{IssueState, NodeStatus, NodeType, Release, ReleaseDraft, ReleaseNode};
use ops_portal_lib::services::github_client::{GitHubClient, GitHubClientConfig};
use ops_portal_lib::services::release_sync::ReleaseSyncService;
use ops_portal_lib::store::{MemoryStore, ReleaseRepository};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Create { title: String },
    SetState { number: u64, state: String },
    Comment { number: u64, body: String },
}

#[derive(Default)]
struct FakeGitHub {
    next_number: u64,
    calls: Vec<Call>,
    /// Titles whose create is rejected with 422.
    reject_titles: HashSet<String>,
    /// Issues whose state change fails with 500.
    broken_issues: HashSet<u64>,
    /// Every comment is rejected with 403.
    comments_forbidden: bool,
    unauthorized: usize,
}

type Shared = Arc<Mutex<FakeGitHub>>;

fn authorized(headers: &HeaderMap, fake: &Shared) -> bool {
    let ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer ghp_test");
    if !ok {
        fake.lock().unwrap().unauthorized += 1;
    }
    ok
}

async fn create_issue(
    State(fake): State<Shared>,
    Path((_owner, _repo)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers, &fake) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"})));
    }
    let title = body["title"].as_str().unwrap_or_default().to_string();
    let mut fake = fake.lock().unwrap();
    fake.calls.push(Call::Create {
        title: title.clone(),
    });

    if fake.reject_titles.contains(&title) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": "Validation Failed"})),
        );
    }

    fake.next_number += 1;
    let number = fake.next_number;
    (
        StatusCode::CREATED,
        Json(json!({
            "id": 1000 + number,
            "number": number,
            "html_url": format!("https://github.com/acme/app/issues/{}", number),
            "created_at": "2024-01-15T10:00:00Z",
            "state": "open",
        })),
    )
}

async fn update_issue(
    State(fake): State<Shared>,
    Path((_owner, _repo, number)): Path<(String, String, u64)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers, &fake) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"})));
    }
    let state = body["state"].as_str().unwrap_or_default().to_string();
    let mut fake = fake.lock().unwrap();
    fake.calls.push(Call::SetState {
        number,
        state: state.clone(),
    });

    if fake.broken_issues.contains(&number) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "Server Error"})),
        );
    }
    (StatusCode::OK, Json(json!({"number": number, "state": state})))
}

async fn add_comment(
    State(fake): State<Shared>,
    Path((_owner, _repo, number)): Path<(String, String, u64)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let body = body["body"].as_str().unwrap_or_default().to_string();
    let mut fake = fake.lock().unwrap();
    fake.calls.push(Call::Comment { number, body });
    if fake.comments_forbidden {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"message": "Resource not accessible by integration"})),
        );
    }
    (StatusCode::CREATED, Json(json!({"id": 1})))
}

/// Start the fake API and return its base URL.
async fn start_fake(fake: Shared) -> String {
    let app = Router::new()
        .route("/repos/{owner}/{repo}/issues", post(create_issue))
        .route("/repos/{owner}/{repo}/issues/{number}", patch(update_issue))
        .route(
            "/repos/{owner}/{repo}/issues/{number}/comments",
            post(add_comment),
        )
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_config(base: &str) -> GitHubClientConfig {
    GitHubClientConfig {
        api_base_url: base.to_string(),
        owner: "acme".to_string(),
        repo: "app".to_string(),
        token: "ghp_test".to_string(),
        timeout_secs: 5,
    }
}

/// Release with `root -> [feature-a -> [task-a], feature-b]`.
fn sample_release() -> Release {
    let tree = ReleaseNode::new("root", "Q1 Release", NodeType::Release).with_children(vec![
        ReleaseNode::new("feature-a", "Dashboard", NodeType::Feature)
            .with_children(vec![ReleaseNode::new("task-a", "Charts", NodeType::Task)]),
        ReleaseNode::new("feature-b", "Billing", NodeType::Feature),
    ]);
    Release::from_draft(
        ReleaseDraft {
            id: Some("rel-1".into()),
            name: "Q1".into(),
            version: "1.0.0".into(),
            nodes: vec![tree],
            ..Default::default()
        },
        chrono::Utc::now(),
    )
    .unwrap()
}

struct Harness {
    fake: Shared,
    store: Arc<MemoryStore>,
    sync: ReleaseSyncService,
}

impl Harness {
    async fn new() -> Self {
        let fake: Shared = Arc::default();
        let base = start_fake(fake.clone()).await;

        let store = Arc::new(MemoryStore::new());
        store.insert_release(&sample_release()).await.unwrap();

        let client = GitHubClient::new(client_config(&base)).unwrap();
        let sync = ReleaseSyncService::new(store.clone(), Arc::new(client));
        Self { fake, store, sync }
    }

    fn calls(&self) -> Vec<Call> {
        self.fake.lock().unwrap().calls.clone()
    }

    fn clear_calls(&self) {
        self.fake.lock().unwrap().calls.clear();
    }

    async fn node(&self, node_id: &str) -> ReleaseNode {
        let release = self.store.get_release("rel-1").await.unwrap().unwrap();
        fn walk<'a>(nodes: &'a [ReleaseNode], id: &str) -> Option<&'a ReleaseNode> {
            nodes
                .iter()
                .find_map(|n| if n.id == id { Some(n) } else { walk(&n.children, id) })
        }
        walk(&release.nodes, node_id).unwrap().clone()
    }
}

#[tokio::test]
async fn test_publish_creates_issues_parent_first_with_links() {
    let h = Harness::new().await;

    let report = h.sync.publish("rel-1").await.unwrap();

    assert!(report.success);
    assert_eq!(report.total_processed, 4);
    assert_eq!(report.created_issues.len(), 4);
    assert_eq!(report.message, "Published 4 issues to GitHub");

    assert_eq!(
        h.calls(),
        vec![
            Call::Create {
                title: "[RELEASE] Q1 Release".into()
            },
            Call::Create {
                title: "[FEATURE] Dashboard".into()
            },
            Call::Comment {
                number: 1,
                body: "Sub-task: #2 - Dashboard".into()
            },
            Call::Create {
                title: "[TASK] Charts".into()
            },
            Call::Comment {
                number: 2,
                body: "Sub-task: #3 - Charts".into()
            },
            Call::Create {
                title: "[FEATURE] Billing".into()
            },
            Call::Comment {
                number: 1,
                body: "Sub-task: #4 - Billing".into()
            },
        ]
    );

    let task = h.node("task-a").await;
    let issue = task.github_issue.unwrap();
    assert_eq!(issue.issue_number, 3);
    assert_eq!(issue.issue_url, "https://github.com/acme/app/issues/3");
    assert_eq!(issue.issue_id, Some(1003));
    assert_eq!(h.fake.lock().unwrap().unauthorized, 0);
}

#[tokio::test]
async fn test_republish_skips_linked_nodes() {
    let h = Harness::new().await;
    h.sync.publish("rel-1").await.unwrap();
    h.clear_calls();

    let report = h.sync.publish("rel-1").await.unwrap();

    assert!(report.success);
    assert!(report.created_issues.is_empty());
    assert_eq!(report.skipped_issues.len(), 4);
    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_parent_does_not_block_children() {
    let h = Harness::new().await;
    h.fake
        .lock()
        .unwrap()
        .reject_titles
        .insert("[FEATURE] Dashboard".into());

    let report = h.sync.publish("rel-1").await.unwrap();

    assert!(!report.success);
    assert_eq!(report.total_processed, 4);
    assert_eq!(report.created_issues.len(), 3);
    assert_eq!(report.failed_issues.len(), 1);

    let failed = &report.failed_issues[0];
    assert_eq!(failed.node_id, "feature-a");
    assert!(failed.error.contains("422"));
    assert!(failed
        .details
        .as_deref()
        .unwrap_or_default()
        .contains("Validation Failed"));

    // The task under the failed feature is created without a link comment.
    let comments: Vec<u64> = h
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Comment { number, .. } => Some(number),
            _ => None,
        })
        .collect();
    assert_eq!(comments, vec![1]);

    assert!(h.node("feature-a").await.github_issue.is_none());
    assert!(h.node("task-a").await.github_issue.is_some());

    // A second pass retries only the failed node.
    h.fake.lock().unwrap().reject_titles.clear();
    h.clear_calls();
    let retry = h.sync.publish("rel-1").await.unwrap();
    assert!(retry.success);
    assert_eq!(retry.created_issues.len(), 1);
    assert_eq!(retry.skipped_issues.len(), 3);
}

#[tokio::test]
async fn test_sync_status_updates_remote_and_local() {
    let h = Harness::new().await;
    h.sync.publish("rel-1").await.unwrap();
    h.clear_calls();

    let report = h
        .sync
        .sync_node_status("rel-1", "task-a", NodeStatus::Completed)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.issue_number, 3);
    assert_eq!(report.remote_state, IssueState::Closed);
    assert_eq!(report.message, "GitHub issue #3 updated");

    let calls = h.calls();
    assert_eq!(
        calls[0],
        Call::SetState {
            number: 3,
            state: "closed".into()
        }
    );
    assert!(matches!(&calls[1], Call::Comment { number: 3, body } if body.contains("completed")));

    let task = h.node("task-a").await;
    assert_eq!(task.properties.status, NodeStatus::Completed);
    assert!(task.github_issue.unwrap().last_synced.is_some());
}

#[tokio::test]
async fn test_rejected_comments_do_not_fail_operations() {
    let h = Harness::new().await;
    h.fake.lock().unwrap().comments_forbidden = true;

    let report = h.sync.publish("rel-1").await.unwrap();
    assert!(report.success);
    assert_eq!(report.created_issues.len(), 4);
    assert!(h.node("task-a").await.github_issue.is_some());
    h.clear_calls();

    let report = h
        .sync
        .sync_node_status("rel-1", "feature-a", NodeStatus::Testing)
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.remote_state, IssueState::Open);
    assert_eq!(h.node("feature-a").await.properties.status, NodeStatus::Testing);

    let report = h
        .sync
        .close_node_issue("rel-1", "feature-b", None)
        .await
        .unwrap();
    assert_eq!(report.issue_number, 4);

    // Each operation still attempted its comment.
    let comments = h
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Comment { .. }))
        .count();
    assert_eq!(comments, 2);
}

#[tokio::test]
async fn test_sync_unpublished_node_makes_no_calls() {
    let h = Harness::new().await;

    let err = h
        .sync
        .sync_node_status("rel-1", "task-a", NodeStatus::Testing)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotPublished { .. }));

    let err = h
        .sync
        .sync_node_status("rel-1", "missing", NodeStatus::Testing)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_close_single_issue_uses_default_reason() {
    let h = Harness::new().await;
    h.sync.publish("rel-1").await.unwrap();
    h.clear_calls();

    let report = h
        .sync
        .close_node_issue("rel-1", "feature-b", Some("  "))
        .await
        .unwrap();
    assert_eq!(report.issue_number, 4);

    let calls = h.calls();
    assert_eq!(
        calls[0],
        Call::SetState {
            number: 4,
            state: "closed".into()
        }
    );
    assert!(matches!(
        &calls[1],
        Call::Comment { number: 4, body } if body.contains("Closed from the release board")
    ));
}

#[tokio::test]
async fn test_close_all_continues_past_failures() {
    let h = Harness::new().await;
    h.sync.publish("rel-1").await.unwrap();
    h.clear_calls();
    h.fake.lock().unwrap().broken_issues.insert(2);

    let report = h.sync.close_all("rel-1").await.unwrap();

    assert!(!report.success);
    assert_eq!(report.closed_issues.len(), 3);
    assert_eq!(report.failed_issues.len(), 1);
    assert_eq!(report.failed_issues[0].node_id, "feature-a");
    assert_eq!(report.message, "Closed 3 GitHub issues");

    let closed: Vec<u64> = h
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::SetState { number, state } if state == "closed" => Some(number),
            _ => None,
        })
        .collect();
    assert_eq!(closed, vec![1, 2, 3, 4]);

    // Local status is left as it was.
    assert_eq!(h.node("root").await.properties.status, NodeStatus::Planning);
    assert!(h
        .node("root")
        .await
        .github_issue
        .unwrap()
        .last_synced
        .is_some());
    assert!(h
        .node("feature-a")
        .await
        .github_issue
        .unwrap()
        .last_synced
        .is_none());
}

#[tokio::test]
async fn test_unreachable_github_is_a_network_error() {
    // Reserve a port, then free it so nothing listens there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = Arc::new(MemoryStore::new());
    store.insert_release(&sample_release()).await.unwrap();
    let client = GitHubClient::new(client_config(&format!("http://{}", addr))).unwrap();
    let sync = ReleaseSyncService::new(store.clone(), Arc::new(client));

    let report = sync.publish("rel-1").await.unwrap();
    assert!(!report.success);
    assert_eq!(report.failed_issues.len(), 4);
    assert!(report.failed_issues.iter().all(|f| f.details.is_none()));

    let stored = store.get_release("rel-1").await.unwrap().unwrap();
    assert!(stored.nodes[0].github_issue.is_none());
}
