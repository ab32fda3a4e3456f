// Test-specific lint overrides: property tests use unwrap freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Property-based reconciliation tests.
//!
//! Uses proptest to verify the convergence guarantees of the event
//! reconciler under at-least-once delivery:
//! 1. Applying every event twice in place leaves the task list in exactly
//!    the state produced by applying each event once.
//! 2. No event sequence ever produces duplicate task ids in the list.
//! 3. The notification feed grows by one entry per applied event and never
//!    exceeds the cap.

use std::sync::Arc;

use proptest::prelude::*;
use taskstream::realtime::EventReconciler;
use taskstream::store::{MAX_NOTIFICATIONS, NotificationStore, TaskStore};
use taskstream_proto::event::TaskEvent;
use taskstream_proto::task::{ChangeSet, Task, TaskId, UserId};

/// An abstract mutation over a small id space, turned into a wire event.
#[derive(Debug, Clone)]
enum Op {
    Created { id: u64, title: String },
    Updated { id: u64, title: String, done: bool },
    Deleted { id: u64, title: String },
}

impl Op {
    fn into_event(self) -> TaskEvent {
        match self {
            Self::Created { id, title } => TaskEvent::created(snapshot(id, &title, false)),
            Self::Updated { id, title, done } => {
                TaskEvent::updated(snapshot(id, &title, done), ChangeSet::new())
            }
            Self::Deleted { id, title } => TaskEvent::deleted(TaskId::new(id), title),
        }
    }
}

fn snapshot(id: u64, title: &str, done: bool) -> Task {
    Task {
        id: TaskId::new(id),
        user_id: UserId::new(1),
        title: title.to_string(),
        description: None,
        is_completed: done,
        created_at: "2026-08-01T10:00:00Z".parse().unwrap(),
        updated_at: "2026-08-01T10:00:00Z".parse().unwrap(),
    }
}

fn arb_op() -> impl Strategy<Value = Op> {
    let id = 1u64..=6;
    let title = "[a-z]{1,12}";
    prop_oneof![
        (id.clone(), title).prop_map(|(id, title)| Op::Created { id, title }),
        (id.clone(), "[a-z]{1,12}", any::<bool>())
            .prop_map(|(id, title, done)| Op::Updated { id, title, done }),
        (id, "[a-z]{1,12}").prop_map(|(id, title)| Op::Deleted { id, title }),
    ]
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(arb_op(), 0..40)
}

fn fresh() -> (Arc<TaskStore>, Arc<NotificationStore>, EventReconciler) {
    let tasks = Arc::new(TaskStore::new());
    let notifications = Arc::new(NotificationStore::new());
    let reconciler = EventReconciler::new(Arc::clone(&tasks), Arc::clone(&notifications));
    (tasks, notifications, reconciler)
}

/// The comparable part of a task list state.
fn fingerprint(tasks: &TaskStore) -> Vec<(TaskId, String, bool)> {
    tasks
        .all()
        .into_iter()
        .map(|t| (t.id, t.title, t.is_completed))
        .collect()
}

proptest! {
    #[test]
    fn double_delivery_converges_to_single_delivery(ops in arb_ops()) {
        let (once_tasks, _, once) = fresh();
        let (twice_tasks, _, twice) = fresh();

        for op in ops {
            let event = op.into_event();
            once.apply(&event);
            twice.apply(&event);
            twice.apply(&event);
        }

        prop_assert_eq!(fingerprint(&once_tasks), fingerprint(&twice_tasks));
    }

    #[test]
    fn task_ids_stay_unique(ops in arb_ops()) {
        let (tasks, _, reconciler) = fresh();

        for op in ops {
            reconciler.apply(&op.into_event());

            let mut ids: Vec<TaskId> = tasks.all().into_iter().map(|t| t.id).collect();
            ids.sort_unstable_by_key(|id| id.as_u64());
            let before = ids.len();
            ids.dedup();
            prop_assert_eq!(before, ids.len());
        }
    }

    #[test]
    fn one_notification_per_event_up_to_the_cap(ops in arb_ops()) {
        let (_, notifications, reconciler) = fresh();
        let total = ops.len();

        for op in ops {
            reconciler.apply(&op.into_event());
        }

        prop_assert_eq!(notifications.len(), total.min(MAX_NOTIFICATIONS));
    }
}
