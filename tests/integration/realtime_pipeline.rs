// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::manual_let_else,
    clippy::future_not_send,
    clippy::redundant_pub_crate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! End-to-end pipeline tests: a task mutation on the service side travels
//! through the hub and lands in a connected client's local stores.
//!
//! These tests validate:
//! - A created task appears in the client's task list, newest first
//! - A completion toggle replaces the client's snapshot and produces the
//!   completion notification text
//! - A title change produces the from/to notification text
//! - A deletion removes the task and produces a warning notification
//! - Each event yields exactly one notification

use std::sync::Arc;
use std::time::Duration;

use taskstream::realtime::publisher::HubPublisher;
use taskstream::realtime::{ConnectionManager, EventReconciler, RealtimeConfig};
use taskstream::store::{NotificationStore, Severity, TaskStore};
use taskstream::tasks::{InMemoryTaskRepository, TaskService, UpdateTask};
use taskstream_proto::task::UserId;

const USER: UserId = UserId::new(1);

/// A client wired into the live pipeline: connection, reconciler, stores.
struct TestClient {
    manager: Arc<ConnectionManager>,
    tasks: Arc<TaskStore>,
    notifications: Arc<NotificationStore>,
}

/// Start a hub, connect a reconciling client, and build a service whose
/// publisher feeds the hub.
async fn setup() -> (
    Arc<taskstream_hub::hub::HubState>,
    TestClient,
    TaskService<InMemoryTaskRepository, HubPublisher>,
) {
    let hub_state = Arc::new(taskstream_hub::hub::HubState::new());
    let (addr, _handle) =
        taskstream_hub::hub::start_server_with_state("127.0.0.1:0", Arc::clone(&hub_state))
            .await
            .expect("failed to start hub");
    let url = format!("ws://{addr}/ws");

    let client = connect_client(&url).await;
    wait_for_subscribers(&hub_state, "tasks", 1).await;

    let publisher = HubPublisher::connect(&url).await.unwrap();
    let service = TaskService::new(Arc::new(InMemoryTaskRepository::new()), Arc::new(publisher));

    (hub_state, client, service)
}

/// Connect one reconciling client to the hub.
async fn connect_client(url: &str) -> TestClient {
    let manager = Arc::new(ConnectionManager::new(RealtimeConfig::new(url)));
    let tasks = Arc::new(TaskStore::new());
    let notifications = Arc::new(NotificationStore::new());
    let reconciler = Arc::new(EventReconciler::new(
        Arc::clone(&tasks),
        Arc::clone(&notifications),
    ));

    manager.acquire();
    manager.initialize().await.unwrap();
    let channel = manager.subscribe("tasks").await;
    reconciler.bind(&channel);

    TestClient {
        manager,
        tasks,
        notifications,
    }
}

/// Poll until the condition holds or fail after 5 seconds.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(condition(), "condition not met within deadline");
}

/// Poll until the hub sees `n` subscribers on a channel.
async fn wait_for_subscribers(state: &taskstream_hub::hub::HubState, channel: &str, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if state.subscriber_count(channel).await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("hub never reached {n} subscriber(s) on {channel}");
}

#[tokio::test]
async fn created_task_reaches_client_store() {
    let (_hub, client, service) = setup().await;

    let task = service.create_task(USER, "Buy milk", None).await.unwrap();

    let tasks = Arc::clone(&client.tasks);
    wait_until(move || tasks.contains(task.id)).await;

    let feed = client.notifications.snapshot();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].severity, Severity::Success);
    assert_eq!(feed[0].title, "New Task Created");
    assert_eq!(
        feed[0].message,
        "Task \"Buy milk\" has been created successfully!"
    );
}

#[tokio::test]
async fn created_tasks_arrive_newest_first() {
    let (_hub, client, service) = setup().await;

    service.create_task(USER, "first", None).await.unwrap();
    let second = service.create_task(USER, "second", None).await.unwrap();

    let tasks = Arc::clone(&client.tasks);
    wait_until(move || tasks.len() == 2).await;

    let all = client.tasks.all();
    assert_eq!(all[0].id, second.id);
}

#[tokio::test]
async fn completion_toggle_updates_client_snapshot() {
    let (_hub, client, service) = setup().await;

    let task = service.create_task(USER, "Chores", None).await.unwrap();
    service.toggle_completion(USER, task.id).await.unwrap();

    let tasks = Arc::clone(&client.tasks);
    wait_until(move || tasks.get(task.id).is_some_and(|t| t.is_completed)).await;

    let notifications = Arc::clone(&client.notifications);
    wait_until(move || notifications.len() == 2).await;

    let feed = client.notifications.snapshot();
    assert_eq!(feed[0].severity, Severity::Info);
    assert_eq!(feed[0].title, "Task Updated");
    assert_eq!(feed[0].message, "Task \"Chores\" has been completed!");
}

#[tokio::test]
async fn title_change_produces_from_to_notification() {
    let (_hub, client, service) = setup().await;

    let task = service.create_task(USER, "Old name", None).await.unwrap();
    service
        .update_task(USER, task.id, UpdateTask {
            title: Some("New name".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let tasks = Arc::clone(&client.tasks);
    wait_until(move || tasks.get(task.id).is_some_and(|t| t.title == "New name")).await;

    let feed = client.notifications.snapshot();
    assert_eq!(
        feed[0].message,
        "Task title updated from \"Old name\" to \"New name\"!"
    );
}

#[tokio::test]
async fn deleted_task_removed_from_client_store() {
    let (_hub, client, service) = setup().await;

    let task = service.create_task(USER, "Doomed", None).await.unwrap();
    let tasks = Arc::clone(&client.tasks);
    wait_until(move || tasks.contains(task.id)).await;

    service.delete_task(USER, task.id).await.unwrap();

    let tasks = Arc::clone(&client.tasks);
    wait_until(move || tasks.is_empty()).await;

    let feed = client.notifications.snapshot();
    assert_eq!(feed[0].severity, Severity::Warning);
    assert_eq!(feed[0].title, "Task Deleted");
    assert_eq!(feed[0].message, "Task \"Doomed\" has been deleted!");
}

#[tokio::test]
async fn each_event_yields_exactly_one_notification() {
    let (_hub, client, service) = setup().await;

    let task = service.create_task(USER, "a", None).await.unwrap();
    service.toggle_completion(USER, task.id).await.unwrap();
    service.delete_task(USER, task.id).await.unwrap();

    let notifications = Arc::clone(&client.notifications);
    wait_until(move || notifications.len() == 3).await;

    // Settle briefly; no extra notifications should trickle in.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.notifications.len(), 3);
}

#[tokio::test]
async fn two_clients_both_reconcile() {
    let hub_state = Arc::new(taskstream_hub::hub::HubState::new());
    let (addr, _handle) =
        taskstream_hub::hub::start_server_with_state("127.0.0.1:0", Arc::clone(&hub_state))
            .await
            .expect("failed to start hub");
    let url = format!("ws://{addr}/ws");

    let client_a = connect_client(&url).await;
    let client_b = connect_client(&url).await;
    wait_for_subscribers(&hub_state, "tasks", 2).await;

    let publisher = HubPublisher::connect(&url).await.unwrap();
    let service = TaskService::new(Arc::new(InMemoryTaskRepository::new()), Arc::new(publisher));

    let task = service.create_task(USER, "shared", None).await.unwrap();

    let tasks_a = Arc::clone(&client_a.tasks);
    wait_until(move || tasks_a.contains(task.id)).await;
    let tasks_b = Arc::clone(&client_b.tasks);
    wait_until(move || tasks_b.contains(task.id)).await;

    client_a.manager.release().await;
    client_b.manager.release().await;
}
