// Test-specific lint overrides: property tests use unwrap freely.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Property-based wire format tests.
//!
//! Uses proptest to verify:
//! 1. Any `TaskEvent` survives encode → decode through the JSON envelope.
//! 2. Random bytes never cause a panic in either decoder (they return
//!    `Err` gracefully).
//! 3. Envelopes with tags outside the closed event set are rejected as
//!    `UnknownEvent`, never misparsed into a variant.
//! 4. Any `HubMessage` survives the postcard round trip.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use taskstream_proto::event::{self, EventCodecError, TaskEvent};
use taskstream_proto::hub::{self, HubMessage};
use taskstream_proto::task::{ChangeSet, FieldChange, Task, TaskId, UserId};

// --- Strategies for protocol types ---

/// Strategy for timestamps between the epoch and roughly 2100.
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800_000).prop_map(|millis| DateTime::from_timestamp_millis(millis).unwrap())
}

/// Strategy for arbitrary task snapshots.
fn arb_task() -> impl Strategy<Value = Task> {
    (
        any::<u64>(),
        any::<u64>(),
        "[^\u{0}]{1,64}",
        prop::option::of("[^\u{0}]{0,128}"),
        any::<bool>(),
        arb_timestamp(),
        arb_timestamp(),
    )
        .prop_map(
            |(id, user_id, title, description, is_completed, created_at, updated_at)| Task {
                id: TaskId::new(id),
                user_id: UserId::new(user_id),
                title,
                description,
                is_completed,
                created_at,
                updated_at,
            },
        )
}

/// Strategy for change-set values (heterogeneous JSON scalars).
fn arb_change_value() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[^\u{0}]{0,32}".prop_map(serde_json::Value::from),
    ]
}

/// Strategy for change sets over the task's mutable fields.
fn arb_change_set() -> impl Strategy<Value = ChangeSet> {
    prop::collection::btree_map(
        prop_oneof![
            Just("title".to_string()),
            Just("description".to_string()),
            Just("is_completed".to_string()),
        ],
        (arb_change_value(), arb_change_value())
            .prop_map(|(from, to)| FieldChange { from, to }),
        0..=3,
    )
}

/// Strategy for arbitrary task events across all three variants.
fn arb_task_event() -> impl Strategy<Value = TaskEvent> {
    prop_oneof![
        (arb_task(), "[^\u{0}]{0,64}", arb_timestamp()).prop_map(
            |(task, message, timestamp)| TaskEvent::Created {
                task,
                message,
                timestamp,
            }
        ),
        (
            arb_task(),
            arb_change_set(),
            "[^\u{0}]{0,64}",
            arb_timestamp()
        )
            .prop_map(|(task, changes, message, timestamp)| TaskEvent::Updated {
                task,
                changes,
                message,
                timestamp,
            }),
        (
            any::<u64>(),
            "[^\u{0}]{1,64}",
            "[^\u{0}]{0,64}",
            arb_timestamp()
        )
            .prop_map(|(id, task_title, message, timestamp)| TaskEvent::Deleted {
                task_id: TaskId::new(id),
                task_title,
                message,
                timestamp,
            }),
    ]
}

/// Strategy for arbitrary hub frames.
fn arb_hub_message() -> impl Strategy<Value = HubMessage> {
    let channel = "[a-z\\-]{1,32}";
    let payload = prop::collection::vec(any::<u8>(), 0..512);
    prop_oneof![
        "[0-9a-f\\-]{1,36}".prop_map(|socket_id| HubMessage::Connected { socket_id }),
        channel.prop_map(|channel| HubMessage::Subscribe { channel }),
        channel.prop_map(|channel| HubMessage::Subscribed { channel }),
        channel.prop_map(|channel| HubMessage::Unsubscribe { channel }),
        (channel, payload.clone())
            .prop_map(|(channel, payload)| HubMessage::Publish { channel, payload }),
        (channel, payload).prop_map(|(channel, payload)| HubMessage::Event { channel, payload }),
        "[^\u{0}]{0,64}".prop_map(|reason| HubMessage::Error { reason }),
    ]
}

// --- Properties ---

proptest! {
    #[test]
    fn task_event_round_trips(event in arb_task_event()) {
        let bytes = event::encode(&event).unwrap();
        let decoded = event::decode(&bytes).unwrap();
        prop_assert_eq!(event, decoded);
    }

    #[test]
    fn event_decode_never_panics_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        // Any outcome is fine as long as it does not panic.
        let _ = event::decode(&bytes);
    }

    #[test]
    fn unknown_event_tags_are_rejected(tag in "[A-Za-z]{1,24}") {
        prop_assume!(tag != "TaskCreated" && tag != "TaskUpdated" && tag != "TaskDeleted");
        let envelope = serde_json::json!({ "event": tag, "data": {} });
        let bytes = serde_json::to_vec(&envelope).unwrap();
        let err = event::decode(&bytes).unwrap_err();
        prop_assert!(matches!(err, EventCodecError::UnknownEvent(name) if name == tag));
    }

    #[test]
    fn hub_message_round_trips(msg in arb_hub_message()) {
        let bytes = hub::encode(&msg).unwrap();
        let decoded = hub::decode(&bytes).unwrap();
        prop_assert_eq!(msg, decoded);
    }

    #[test]
    fn hub_decode_never_panics_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = hub::decode(&bytes);
    }
}
