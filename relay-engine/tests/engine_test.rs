//! Integration tests for [`relay_engine::RelayEngine`] against the mock transport and the
//! in-memory mapping store.

mod common;

use std::time::Duration;

use common::mock_transport::{Call, Op};
use common::{harness, harness_with, fast_policy, SOURCE, T1, T2, T3};
use relay_core::{fingerprint, MediaDescriptor, MediaKind, Message, TextEntity, TransportError};
use relay_engine::{Disposition, IgnoreReason, RetryPolicy, TargetAction};
use storage::{MappingStore, MessageRecord};

fn photo(id: i32, unique: &str, caption: &str) -> Message {
    Message::media(
        SOURCE,
        id,
        MediaDescriptor::new(MediaKind::Photo).with_unique_id(unique),
        Some(caption.to_string()),
    )
}

/// **Test: new message fans out, text edit propagates in place.**
///
/// **Setup:** Targets T1, T2.
/// **Action:** New text message 100 "hello", then an edit to "hello world".
/// **Expected:** One send per target and two records; the edit reaches both copies with the new
/// text, target ids stay the same and fingerprints change.
#[tokio::test]
async fn test_new_then_text_edit() {
    let h = harness(&[T1, T2]);
    let original = Message::text(SOURCE, 100, "hello");

    let report = h.engine.handle_new(&original).await.unwrap();
    assert_eq!(report.disposition, Disposition::Relayed);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(h.transport.sends().len(), 2);

    let before = h.store.find_by_source(SOURCE, 100).await.unwrap();
    assert_eq!(before.len(), 2);
    let expected_fp = fingerprint(&original);
    assert!(before
        .iter()
        .all(|r| r.fingerprint.as_deref() == Some(expected_fp.as_str())));

    let edited = Message::text(SOURCE, 100, "hello world");
    let report = h.engine.handle_edit(&edited).await.unwrap();
    assert_eq!(report.succeeded(), 2);

    let edits = h.transport.edits();
    assert_eq!(edits.len(), 2);
    for record in &before {
        assert!(edits.contains(&Call::Edit {
            chat: record.target_chat_id.unwrap(),
            message_id: record.target_msg_id.unwrap(),
            text: "hello world".to_string(),
            entities: Vec::new(),
        }));
    }

    let after = h.store.find_by_source(SOURCE, 100).await.unwrap();
    let new_fp = fingerprint(&edited);
    for record in &after {
        let old = before
            .iter()
            .find(|r| r.target_chat_id == record.target_chat_id)
            .unwrap();
        assert_eq!(record.target_msg_id, old.target_msg_id);
        assert_eq!(record.fingerprint.as_deref(), Some(new_fp.as_str()));
    }
}

/// **Test: a formatting-only edit reaches the copy with its entities.**
///
/// **Setup:** Message 110 "read the docs" relayed to T1.
/// **Action:** Edit that only links "docs" and bolds "read".
/// **Expected:** One edit carrying the same text and both entities; the stored fingerprint
/// follows the formatting.
#[tokio::test]
async fn test_formatting_only_edit_carries_entities() {
    let h = harness(&[T1]);
    h.engine
        .handle_new(&Message::text(SOURCE, 110, "read the docs"))
        .await
        .unwrap();
    let copy = h.store.find_by_source(SOURCE, 110).await.unwrap()[0].target_msg_id.unwrap();

    let entities = vec![
        TextEntity::new("bold", 0, 4),
        TextEntity::new("text_link", 9, 4).with_url("https://docs.rs/"),
    ];
    let formatted = Message::text(SOURCE, 110, "read the docs").with_entities(entities.clone());
    let report = h.engine.handle_edit(&formatted).await.unwrap();

    assert!(matches!(
        report.outcome_for(T1).unwrap().result,
        Ok(TargetAction::Updated { target_msg_id }) if target_msg_id == copy
    ));
    assert_eq!(
        h.transport.edits(),
        vec![Call::Edit {
            chat: T1,
            message_id: copy,
            text: "read the docs".to_string(),
            entities,
        }]
    );
    let record = &h.store.find_by_source(SOURCE, 110).await.unwrap()[0];
    assert_eq!(record.fingerprint.as_deref(), Some(fingerprint(&formatted).as_str()));
}

/// **Test: duplicate delivery of a new message is idempotent.**
#[tokio::test]
async fn test_new_delivered_twice_sends_once_per_target() {
    let h = harness(&[T1, T2]);
    let message = Message::text(SOURCE, 101, "once");

    h.engine.handle_new(&message).await.unwrap();
    let second = h.engine.handle_new(&message).await.unwrap();

    assert_eq!(h.transport.sends().len(), 2);
    assert!(second
        .outcomes
        .iter()
        .all(|o| matches!(o.result, Ok(TargetAction::AlreadyLinked))));
    assert_eq!(h.store.find_by_source(SOURCE, 101).await.unwrap().len(), 2);
}

/// **Test: edit with identical content is a no-op.**
///
/// **Expected:** No transport call and `updated_at` untouched.
#[tokio::test]
async fn test_unchanged_edit_is_noop() {
    let h = harness(&[T1]);
    let message = Message::text(SOURCE, 102, "same");
    h.engine.handle_new(&message).await.unwrap();
    let stamp = h.store.find_by_source(SOURCE, 102).await.unwrap()[0].updated_at;
    let calls_before = h.transport.calls().len();

    let report = h.engine.handle_edit(&message).await.unwrap();

    assert!(matches!(
        report.outcome_for(T1).unwrap().result,
        Ok(TargetAction::Unchanged)
    ));
    assert_eq!(h.transport.calls().len(), calls_before);
    assert_eq!(
        h.store.find_by_source(SOURCE, 102).await.unwrap()[0].updated_at,
        stamp
    );
}

/// **Test: one failing target does not affect the others.**
///
/// **Setup:** Targets T1, T2, T3; every send to T2 fails permanently.
/// **Expected:** T1 and T3 linked, T2 reported failed and not retryable, no T2 record.
#[tokio::test]
async fn test_fan_out_independence() {
    let h = harness(&[T1, T2, T3]);
    h.transport
        .fail_always(Op::Send, T2, TransportError::Api("bot was kicked".into()));

    let report = h.engine.handle_new(&Message::text(SOURCE, 103, "x")).await.unwrap();

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.needs_retry());
    assert!(report.outcome_for(T2).unwrap().result.is_err());
    assert!(h.store.exists(SOURCE, 103, T1).await.unwrap());
    assert!(!h.store.exists(SOURCE, 103, T2).await.unwrap());
    assert!(h.store.exists(SOURCE, 103, T3).await.unwrap());
}

/// **Test: edit of an untracked message leaves exactly one placeholder.**
#[tokio::test]
async fn test_edit_of_untracked_message_records_placeholder() {
    let h = harness(&[T1, T2]);
    let edited = Message::text(SOURCE, 200, "edited before we saw it");

    let first = h.engine.handle_edit(&edited).await.unwrap();
    let second = h.engine.handle_edit(&edited).await.unwrap();

    assert_eq!(first.disposition, Disposition::Placeholder);
    assert_eq!(second.disposition, Disposition::Placeholder);
    assert!(h.transport.calls().is_empty());

    let records = h.store.find_by_source(SOURCE, 200).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_linked());
    assert_eq!(h.store.count_pending().await.unwrap(), 1);
}

/// **Test: relaying a placeholder-tracked message claims the placeholder.**
#[tokio::test]
async fn test_new_claims_placeholder() {
    let h = harness(&[T1, T2]);
    let message = Message::text(SOURCE, 201, "late");
    h.engine.handle_edit(&message).await.unwrap();

    h.engine.handle_new(&message).await.unwrap();

    let records = h.store.find_by_source(SOURCE, 201).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(MessageRecord::is_linked));
    assert_eq!(h.store.count_pending().await.unwrap(), 0);
}

/// **Test: media edit deletes and resends.**
///
/// **Expected:** One delete of the old copy, one new send, record repointed to the new id.
#[tokio::test]
async fn test_media_edit_replaces_copy() {
    let h = harness(&[T1]);
    h.engine.handle_new(&photo(300, "AQAD1", "cap")).await.unwrap();
    let old = h.store.find_by_source(SOURCE, 300).await.unwrap()[0].clone();
    assert!(old.has_media);

    let report = h
        .engine
        .handle_edit(&photo(300, "AQAD2", "cap"))
        .await
        .unwrap();

    let action = report.outcome_for(T1).unwrap().result.as_ref().unwrap().clone();
    let TargetAction::Replaced {
        old_msg_id,
        new_msg_id,
    } = action
    else {
        panic!("expected replace, got {:?}", action);
    };
    assert_eq!(Some(old_msg_id), old.target_msg_id);
    assert_ne!(old_msg_id, new_msg_id);
    assert_eq!(
        h.transport.deletes(),
        vec![Call::Delete {
            chat: T1,
            message_id: old_msg_id
        }]
    );
    assert_eq!(h.transport.sends_to(T1), 2);

    let current = h.store.find_by_source(SOURCE, 300).await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].target_msg_id, Some(new_msg_id));
}

/// **Test: caption-only change on a media message also resends.**
#[tokio::test]
async fn test_media_caption_change_resends() {
    let h = harness(&[T1]);
    h.engine.handle_new(&photo(301, "AQAD1", "before")).await.unwrap();

    let report = h
        .engine
        .handle_edit(&photo(301, "AQAD1", "after"))
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_for(T1).unwrap().result,
        Ok(TargetAction::Replaced { .. })
    ));
    assert!(h.transport.edits().is_empty());
}

/// **Test: a failed delete does not stop the replacement.**
#[tokio::test]
async fn test_delete_failure_is_non_fatal() {
    let h = harness(&[T1]);
    h.engine.handle_new(&photo(302, "AQAD1", "")).await.unwrap();
    h.transport.fail_next(
        Op::Delete,
        T1,
        TransportError::NotFound("message to delete not found".into()),
    );

    let report = h.engine.handle_edit(&photo(302, "AQAD9", "")).await.unwrap();

    assert!(matches!(
        report.outcome_for(T1).unwrap().result,
        Ok(TargetAction::Replaced { .. })
    ));
    assert_eq!(h.transport.sends_to(T1), 2);
}

/// **Test: the linked copy disappeared; the edit relinks to a fresh copy.**
#[tokio::test]
async fn test_edit_of_deleted_copy_relinks() {
    let h = harness(&[T1]);
    h.engine.handle_new(&Message::text(SOURCE, 400, "v1")).await.unwrap();
    h.transport.fail_next(
        Op::Edit,
        T1,
        TransportError::NotFound("message to edit not found".into()),
    );

    let report = h
        .engine
        .handle_edit(&Message::text(SOURCE, 400, "v2"))
        .await
        .unwrap();

    let Ok(TargetAction::Relinked { new_msg_id, .. }) = report.outcome_for(T1).unwrap().result
    else {
        panic!("expected relink");
    };
    let record = &h.store.find_by_source(SOURCE, 400).await.unwrap()[0];
    assert_eq!(record.target_msg_id, Some(new_msg_id));
}

/// **Test: "message is not modified" counts as a successful edit.**
#[tokio::test]
async fn test_not_modified_counts_as_updated() {
    let h = harness(&[T1]);
    h.engine.handle_new(&Message::text(SOURCE, 401, "text")).await.unwrap();
    h.transport
        .fail_next(Op::Edit, T1, TransportError::NotModified);

    let edited = Message::text(SOURCE, 401, "text ");
    let report = h.engine.handle_edit(&edited).await.unwrap();

    assert!(matches!(
        report.outcome_for(T1).unwrap().result,
        Ok(TargetAction::Updated { .. })
    ));
    let record = &h.store.find_by_source(SOURCE, 401).await.unwrap()[0];
    assert_eq!(
        record.fingerprint.as_deref(),
        Some(fingerprint(&edited).as_str())
    );
}

/// **Test: an edit completes a partial fan-out.**
///
/// **Setup:** The first relay failed for T2.
/// **Expected:** The edit updates T1 in place and sends a fresh copy to T2.
#[tokio::test]
async fn test_edit_completes_missing_target() {
    let h = harness(&[T1, T2]);
    h.transport
        .fail_next(Op::Send, T2, TransportError::Api("chat write forbidden".into()));
    h.engine.handle_new(&Message::text(SOURCE, 500, "a")).await.unwrap();
    assert!(!h.store.exists(SOURCE, 500, T2).await.unwrap());

    let report = h
        .engine
        .handle_edit(&Message::text(SOURCE, 500, "b"))
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_for(T1).unwrap().result,
        Ok(TargetAction::Updated { .. })
    ));
    assert!(matches!(
        report.outcome_for(T2).unwrap().result,
        Ok(TargetAction::Created { .. })
    ));
    assert!(h.store.exists(SOURCE, 500, T2).await.unwrap());
}

/// **Test: foreign chats and service messages are ignored.**
#[tokio::test]
async fn test_ignored_events() {
    let h = harness(&[T1]);

    let foreign = h
        .engine
        .handle_new(&Message::text(-999, 1, "elsewhere"))
        .await
        .unwrap();
    let service = h
        .engine
        .handle_new(&Message::service(SOURCE, 2))
        .await
        .unwrap();
    let service_edit = h
        .engine
        .handle_edit(&Message::service(SOURCE, 3))
        .await
        .unwrap();

    assert_eq!(foreign.disposition, Disposition::Ignored(IgnoreReason::ForeignChat));
    assert_eq!(service.disposition, Disposition::Ignored(IgnoreReason::Service));
    assert_eq!(service_edit.disposition, Disposition::Ignored(IgnoreReason::Service));
    assert!(h.transport.calls().is_empty());
    assert!(h.store.is_empty().await);
}

/// **Test: a rate-limited send waits the requested time and succeeds.**
#[tokio::test(start_paused = true)]
async fn test_rate_limited_send_waits_and_links() {
    let h = harness(&[T1]);
    h.transport.fail_next(
        Op::Send,
        T1,
        TransportError::RateLimited(Duration::from_secs(3)),
    );
    let started = tokio::time::Instant::now();

    let report = h.engine.handle_new(&Message::text(SOURCE, 600, "slow")).await.unwrap();

    assert_eq!(report.succeeded(), 1);
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(h.store.exists(SOURCE, 600, T1).await.unwrap());
}

/// **Test: exhausted transient failures are reported retryable and leave no record.**
#[tokio::test(start_paused = true)]
async fn test_exhausted_transient_failure_needs_retry() {
    let h = harness_with(
        &[T1],
        RetryPolicy {
            max_retries: 1,
            ..fast_policy()
        },
    );
    h.transport
        .fail_always(Op::Send, T1, TransportError::Network("reset".into()));

    let report = h.engine.handle_new(&Message::text(SOURCE, 601, "x")).await.unwrap();

    assert!(report.needs_retry());
    assert!(!h.store.exists(SOURCE, 601, T1).await.unwrap());
}
