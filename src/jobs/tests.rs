use super::*;
use std::sync::Arc;

fn submit(store: &JobStore, url: &str, client: &str, request_id: Option<&str>) -> Result<(), AdmissionError> {
    store.submit(
        url.to_string(),
        PathBuf::from("/tmp/doc.yaml"),
        Some(client.to_string()),
        RunOptions::default(),
        request_id.map(str::to_string),
    )
}

#[test]
fn fresh_submit_is_admitted_and_queues_descriptor() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/y", "1.2.3.4", None).unwrap();
    assert!(handle.store.is_active("https://x/y"));
    assert_eq!(handle.store.queue_info().depth, 1);
}

#[test]
fn resubmit_same_request_id_is_idempotent() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/y", "1.2.3.4", Some("r1")).unwrap();
    submit(&handle.store, "https://x/y", "1.2.3.4", Some("r1")).unwrap();
    // Only one descriptor should have been pushed.
    assert_eq!(handle.store.queue_info().depth, 1);
}

#[test]
fn resubmit_new_request_id_cancels_old_and_admits_new() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/y", "1.2.3.4", Some("r1")).unwrap();
    let old_record = handle.store.record("https://x/y").unwrap();

    submit(&handle.store, "https://x/y", "1.2.3.4", Some("r2")).unwrap();

    assert_eq!(old_record.state(), JobState::Cancelled);
    let new_record = handle.store.record("https://x/y").unwrap();
    assert_eq!(new_record.request_id.as_deref(), Some("r2"));
}

#[test]
fn client_exclusivity_rejects_second_distinct_url() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/u1", "1.2.3.4", None).unwrap();
    let result = submit(&handle.store, "https://x/u2", "1.2.3.4", None);
    assert!(matches!(result, Err(AdmissionError::ClientBusy)));
}

#[test]
fn client_exclusivity_allows_resubmitting_same_url() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/u1", "1.2.3.4", Some("r1")).unwrap();
    let result = submit(&handle.store, "https://x/u1", "1.2.3.4", Some("r1"));
    assert!(result.is_ok());
}

#[test]
fn client_claim_released_once_job_terminal_allows_new_submission() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/u1", "1.2.3.4", None).unwrap();
    let record = handle.store.record("https://x/u1").unwrap();
    record.complete();

    let result = submit(&handle.store, "https://x/u2", "1.2.3.4", None);
    assert!(result.is_ok());
}

#[test]
fn cancel_with_matching_request_id_succeeds() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/y", "1.2.3.4", Some("r1")).unwrap();
    assert!(handle.store.cancel("https://x/y", Some("r1")));
    assert_eq!(handle.store.record("https://x/y").unwrap().state(), JobState::Cancelled);
}

#[test]
fn cancel_with_mismatched_request_id_is_noop() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/y", "1.2.3.4", Some("r1")).unwrap();
    assert!(!handle.store.cancel("https://x/y", Some("other")));
    assert_eq!(handle.store.record("https://x/y").unwrap().state(), JobState::Queued);
}

#[test]
fn cancel_unknown_url_returns_false() {
    let handle = JobStore::new();
    assert!(!handle.store.cancel("https://nope", None));
}

#[test]
fn descriptor_captures_record_identity_not_url_relookup() {
    let mut handle = JobStore::new();
    submit(&handle.store, "https://x/y", "1.2.3.4", Some("r1")).unwrap();
    let first_descriptor = handle.queue_rx.try_recv().unwrap();
    let first_record = handle.store.record("https://x/y").unwrap();
    assert!(Arc::ptr_eq(&first_descriptor.record, &first_record));

    // Resubmit with a new request_id: the URL key now points at a second
    // record, but the first descriptor must keep referring to the first one.
    submit(&handle.store, "https://x/y", "1.2.3.4", Some("r2")).unwrap();
    let second_descriptor = handle.queue_rx.try_recv().unwrap();
    let second_record = handle.store.record("https://x/y").unwrap();

    assert_eq!(first_descriptor.record.state(), JobState::Cancelled);
    assert!(!Arc::ptr_eq(&first_descriptor.record, &second_record));
    assert!(Arc::ptr_eq(&second_descriptor.record, &second_record));
}

#[test]
fn drain_logs_returns_all_then_empties() {
    let handle = JobStore::new();
    submit(&handle.store, "https://x/y", "1.2.3.4", None).unwrap();
    let record = handle.store.record("https://x/y").unwrap();
    record.update_progress(1, 5, "a".to_string());
    record.update_progress(2, 5, "b".to_string());

    let logs = record.drain_logs();
    assert_eq!(logs, vec!["a".to_string(), "b".to_string()]);
    assert!(record.drain_logs().is_empty());
}
