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

//! Duplicate and stray event delivery through the live pipeline.
//!
//! These tests validate:
//! - The same created event delivered twice leaves one task in the store
//!   (and one notification per delivery)
//! - An updated event for an unknown task id changes nothing in the list
//! - A deleted event for an unknown task id changes nothing in the list
//! - Malformed payloads on the channel are skipped without killing the
//!   connection

use std::sync::Arc;
use std::time::Duration;

use taskstream::realtime::publisher::{EventPublisher, HubPublisher};
use taskstream::realtime::{ConnectionManager, EventReconciler, RealtimeConfig};
use taskstream::store::{NotificationStore, TaskStore};
use taskstream_proto::event::TaskEvent;
use taskstream_proto::task::{ChangeSet, Task, TaskId, UserId};

fn make_task(id: u64, title: &str) -> Task {
    Task {
        id: TaskId::new(id),
        user_id: UserId::new(1),
        title: title.to_string(),
        description: None,
        is_completed: false,
        created_at: "2026-08-01T10:00:00Z".parse().unwrap(),
        updated_at: "2026-08-01T10:00:00Z".parse().unwrap(),
    }
}

struct Pipeline {
    hub: Arc<taskstream_hub::hub::HubState>,
    _manager: Arc<ConnectionManager>,
    tasks: Arc<TaskStore>,
    notifications: Arc<NotificationStore>,
    publisher: HubPublisher,
}

async fn setup() -> Pipeline {
    let hub = Arc::new(taskstream_hub::hub::HubState::new());
    let (addr, _handle) =
        taskstream_hub::hub::start_server_with_state("127.0.0.1:0", Arc::clone(&hub))
            .await
            .expect("failed to start hub");
    let url = format!("ws://{addr}/ws");

    let manager = Arc::new(ConnectionManager::new(RealtimeConfig::new(&url)));
    let tasks = Arc::new(TaskStore::new());
    let notifications = Arc::new(NotificationStore::new());
    let reconciler = Arc::new(EventReconciler::new(
        Arc::clone(&tasks),
        Arc::clone(&notifications),
    ));

    manager.initialize().await.unwrap();
    let channel = manager.subscribe("tasks").await;
    reconciler.bind(&channel);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if hub.subscriber_count("tasks").await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let publisher = HubPublisher::connect(&url).await.unwrap();

    Pipeline {
        hub,
        _manager: manager,
        tasks,
        notifications,
        publisher,
    }
}

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

#[tokio::test]
async fn duplicated_created_event_converges_to_one_task() {
    let pipeline = setup().await;

    // The exact same event (same payload bytes) delivered twice.
    let event = TaskEvent::created(make_task(1, "once"));
    pipeline.publisher.publish(&event).await.unwrap();
    pipeline.publisher.publish(&event).await.unwrap();

    let notifications = Arc::clone(&pipeline.notifications);
    wait_until(move || notifications.len() == 2).await;

    assert_eq!(pipeline.tasks.len(), 1);
    assert_eq!(pipeline.tasks.get(TaskId::new(1)).unwrap().title, "once");
}

#[tokio::test]
async fn update_for_unknown_task_changes_nothing() {
    let pipeline = setup().await;

    let event = TaskEvent::updated(make_task(42, "ghost"), ChangeSet::new());
    pipeline.publisher.publish(&event).await.unwrap();

    let notifications = Arc::clone(&pipeline.notifications);
    wait_until(move || notifications.len() == 1).await;

    assert!(pipeline.tasks.is_empty());
}

#[tokio::test]
async fn delete_for_unknown_task_changes_nothing() {
    let pipeline = setup().await;

    pipeline
        .publisher
        .publish(&TaskEvent::created(make_task(1, "kept")))
        .await
        .unwrap();
    let tasks = Arc::clone(&pipeline.tasks);
    wait_until(move || tasks.len() == 1).await;

    let event = TaskEvent::deleted(TaskId::new(42), "ghost".to_string());
    pipeline.publisher.publish(&event).await.unwrap();

    let notifications = Arc::clone(&pipeline.notifications);
    wait_until(move || notifications.len() == 2).await;

    assert_eq!(pipeline.tasks.len(), 1);
    assert!(pipeline.tasks.contains(TaskId::new(1)));
}

#[tokio::test]
async fn malformed_payload_is_skipped_without_dropping_connection() {
    let pipeline = setup().await;

    // Junk bytes straight onto the channel, bypassing the event codec.
    pipeline.hub.publish("tasks", b"not an event".to_vec()).await;

    // A well-formed event afterwards still arrives.
    pipeline
        .publisher
        .publish(&TaskEvent::created(make_task(1, "survivor")))
        .await
        .unwrap();

    let tasks = Arc::clone(&pipeline.tasks);
    wait_until(move || tasks.contains(TaskId::new(1))).await;
    assert_eq!(pipeline.notifications.len(), 1);
}
