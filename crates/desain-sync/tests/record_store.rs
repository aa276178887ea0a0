//! RecordStore behaviour against the in-memory backends.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use desain_core::attachment::LocalFile;
use desain_core::record::{DesignRecord, RecordPatch, Status, StatusView};
use desain_service::memory::{MemoryObjectStore, MemoryOp, MemoryService};
use desain_service::RecordService;
use desain_store::ObjectStore;
use desain_sync::{NewDesign, RecordStore, SessionGate, SyncError};

struct Harness {
    svc: Arc<MemoryService>,
    blobs: Arc<MemoryObjectStore>,
    gate: Arc<SessionGate>,
}

impl Harness {
    async fn signed_in() -> Self {
        let svc = Arc::new(
            MemoryService::new()
                .with_user("user-a", "a@example.com", "secret1")
                .with_user("user-b", "b@example.com", "secret2"),
        );
        let gate = Arc::new(SessionGate::new(svc.clone()));
        gate.sign_in("a@example.com", "secret1").await.unwrap();
        Self {
            svc,
            blobs: Arc::new(MemoryObjectStore::new()),
            gate,
        }
    }

    fn store(&self, view: StatusView) -> RecordStore {
        RecordStore::new(view, self.svc.clone(), self.blobs.clone(), self.gate.clone())
    }

    fn record(&self, id: &str, client: &str, status: Status, owner: &str, age_secs: i64) -> DesignRecord {
        let base: DateTime<Utc> = DateTime::from_timestamp(1_756_684_800, 0).unwrap();
        DesignRecord {
            id: id.into(),
            client_name: client.into(),
            briefing_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            briefing_text: format!("brief for {client}"),
            reference_files: vec![],
            result_files: vec![],
            status,
            briefing_seen: true,
            result_seen: true,
            owner_user_id: owner.into(),
            created_at: base - Duration::seconds(age_secs),
        }
    }

    fn seed(&self, id: &str, client: &str, status: Status, owner: &str, age_secs: i64) {
        self.svc.insert(self.record(id, client, status, owner, age_secs));
    }

    fn seed_with_files(&self, id: &str, status: Status, refs: &[&str], results: &[&str]) {
        let mut record = self.record(id, "Warung Sejahtera", status, "user-a", 0);
        record.reference_files = refs.iter().map(|k| self.blobs.seed(k, "ref")).collect();
        record.result_files = results.iter().map(|k| self.blobs.seed(k, "res")).collect();
        self.svc.insert(record);
    }
}

fn ids(records: &[DesignRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn load_scopes_to_view_and_owner_newest_first() {
    let h = Harness::signed_in().await;
    h.seed("1", "Old Queued", Status::Queued, "user-a", 30);
    h.seed("2", "In Progress", Status::InProgress, "user-a", 20);
    h.seed("3", "Revising", Status::Revision, "user-a", 10);
    h.seed("4", "Finished", Status::Done, "user-a", 5);
    h.seed("5", "Someone Else", Status::Queued, "user-b", 1);

    let new = h.store(StatusView::New);
    let records = new.load().await.unwrap();
    assert_eq!(ids(&records), vec!["2", "1"]);
    assert_eq!(new.snapshot().owner.as_deref(), Some("user-a"));

    let revision = h.store(StatusView::Revision);
    assert_eq!(ids(&revision.load().await.unwrap()), vec!["3"]);
    let done = h.store(StatusView::Done);
    assert_eq!(ids(&done.load().await.unwrap()), vec!["4"]);
}

#[tokio::test]
async fn failed_load_keeps_previous_list() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Queued, "user-a", 0);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();

    h.svc.fail(MemoryOp::List);
    let err = store.load().await.unwrap_err();
    assert!(matches!(err, SyncError::FetchFailed(_)));
    assert_eq!(ids(&store.snapshot().records), vec!["1"]);
}

#[tokio::test]
async fn local_filter_matches_client_name_case_insensitively() {
    let h = Harness::signed_in().await;
    h.seed("1", "Warung Makan Sejahtera", Status::Queued, "user-a", 2);
    h.seed("2", "Toko Roti", Status::Queued, "user-a", 1);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();

    assert_eq!(ids(&store.filtered("WARUNG")), vec!["1"]);
    assert_eq!(ids(&store.filtered("   ")), vec!["2", "1"]);
    assert!(store.filtered("bakso").is_empty());
}

#[tokio::test]
async fn calls_without_identity_are_unauthenticated() {
    let h = Harness::signed_in().await;
    h.gate.sign_out().await.unwrap();
    let store = h.store(StatusView::New);
    assert!(matches!(store.load().await, Err(SyncError::Unauthenticated)));
    assert!(matches!(store.remove("1").await, Err(SyncError::Unauthenticated)));
}

#[tokio::test]
async fn approve_from_queued_is_rejected_without_remote_call() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Queued, "user-a", 0);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();

    let err = store.approve("1").await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::IllegalTransition { from: Status::Queued, to: Status::Done }
    ));
    assert_eq!(h.svc.update_calls(), 0);
    assert_eq!(store.snapshot().records[0].status, Status::Queued);
}

#[tokio::test]
async fn approve_from_revision_leaves_seen_flags() {
    let h = Harness::signed_in().await;
    let mut record = h.record("1", "A", Status::Revision, "user-a", 0);
    record.result_seen = false;
    h.svc.insert(record);
    let store = h.store(StatusView::Revision);
    store.load().await.unwrap();

    let done = store.approve("1").await.unwrap();
    assert_eq!(done.status, Status::Done);
    assert!(done.briefing_seen);
    assert!(!done.result_seen);
    assert_eq!(h.svc.record("1").unwrap().status, Status::Done);
    // Replaced in place, not reordered or dropped.
    assert_eq!(store.snapshot().records[0].status, Status::Done);
}

#[tokio::test]
async fn briefing_edit_on_revision_marks_briefing_unseen() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Revision, "user-a", 0);
    let store = h.store(StatusView::Revision);
    store.load().await.unwrap();

    let mut edit = store.begin_edit("1").unwrap();
    edit.briefing_text = "warna logo diganti biru".into();
    let updated = store.save_edit(edit).await.unwrap().unwrap();

    assert_eq!(updated.briefing_text, "warna logo diganti biru");
    assert!(!updated.briefing_seen);
    assert!(!h.svc.record("1").unwrap().briefing_seen);
    assert!(!store.snapshot().records[0].briefing_seen);
}

#[tokio::test]
async fn briefing_edit_outside_revision_keeps_seen_flag() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Queued, "user-a", 0);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();

    let mut edit = store.begin_edit("1").unwrap();
    edit.briefing_text = "updated".into();
    let updated = store.save_edit(edit).await.unwrap().unwrap();
    assert!(updated.briefing_seen);
}

#[tokio::test]
async fn result_upload_on_revision_marks_result_unseen() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Revision, "user-a", 0);
    let store = h.store(StatusView::Revision);
    store.load().await.unwrap();

    let updated = store
        .commit(
            "1",
            RecordPatch {
                result_files: Some(vec!["memory://desain-files/designer/1_final.png".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.result_seen);

    let seen = store.mark_result_seen("1").await.unwrap();
    assert!(seen.result_seen);
    let calls = h.svc.update_calls();
    store.mark_result_seen("1").await.unwrap();
    assert_eq!(h.svc.update_calls(), calls, "already seen is a no-op");
}

#[tokio::test]
async fn noop_edit_makes_no_calls() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Queued, "user-a", 0);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();

    let edit = store.begin_edit("1").unwrap();
    assert!(store.save_edit(edit).await.unwrap().is_none());
    assert_eq!(h.svc.update_calls(), 0);
    assert_eq!(h.blobs.put_calls(), 0);
}

#[tokio::test]
async fn signed_out_noop_edit_is_unauthenticated() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Queued, "user-a", 0);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();
    let edit = store.begin_edit("1").unwrap();

    h.gate.sign_out().await.unwrap();
    assert!(edit.is_noop());
    assert!(matches!(store.save_edit(edit).await, Err(SyncError::Unauthenticated)));
}

#[tokio::test]
async fn edit_with_non_image_file_is_rejected_before_io() {
    let h = Harness::signed_in().await;
    h.seed_with_files("9", Status::Revision, &["user-a/1_a.png"], &[]);
    let store = h.store(StatusView::Revision);
    store.load().await.unwrap();

    let mut edit = store.begin_edit("9").unwrap();
    let first = edit.attachments.persisted()[0].clone();
    edit.attachments.stage_remove(&first);
    edit.attachments.stage_add(LocalFile::new("notes.txt", "n"));
    edit.briefing_text = "ganti".into();
    let err = store.save_edit(edit).await.unwrap_err();

    assert!(matches!(err, SyncError::InvalidInput(ref msg) if msg.contains("notes.txt")));
    assert_eq!(h.blobs.put_calls(), 0);
    assert_eq!(h.blobs.delete_calls(), 0);
    assert!(h.blobs.contains("user-a/1_a.png"));
    assert_eq!(h.svc.update_calls(), 0);
}

#[tokio::test]
async fn failed_upload_sends_no_update() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Revision, "user-a", 0);
    let store = h.store(StatusView::Revision);
    store.load().await.unwrap();
    h.blobs.fail_uploads_named("fileA.png");

    let mut edit = store.begin_edit("1").unwrap();
    edit.attachments.stage_add(LocalFile::new("fileA.png", "a"));
    edit.attachments.stage_add(LocalFile::new("fileB.png", "b"));
    let err = store.save_edit(edit).await.unwrap_err();

    assert!(matches!(err, SyncError::UploadFailed { ref file, .. } if file == "fileA.png"));
    assert_eq!(h.blobs.put_calls(), 1, "fileB is never attempted");
    assert_eq!(h.svc.update_calls(), 0);
    let record = &store.snapshot().records[0];
    assert!(record.reference_files.is_empty());
    assert!(record.briefing_seen);
}

#[tokio::test]
async fn attachment_edit_removes_and_appends() {
    let h = Harness::signed_in().await;
    h.seed_with_files("9", Status::Queued, &["user-a/1_a.png", "user-a/2_b.png"], &[]);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();

    let mut edit = store.begin_edit("9").unwrap();
    let first = edit.attachments.persisted()[0].clone();
    let second = edit.attachments.persisted()[1].clone();
    assert!(edit.attachments.stage_remove(&first));
    edit.attachments.stage_add(LocalFile::new("c.png", "c"));
    let updated = store.save_edit(edit).await.unwrap().unwrap();

    assert_eq!(updated.reference_files.len(), 2);
    assert_eq!(updated.reference_files[0], second);
    assert!(updated.reference_files[1].ends_with("_c.png"));
    assert!(!h.blobs.contains("user-a/1_a.png"));
}

#[tokio::test]
async fn remove_deletes_attachments_then_row() {
    let h = Harness::signed_in().await;
    h.seed_with_files("9", Status::Revision, &["user-a/1_a.png"], &["designer/2_final.png"]);
    let store = h.store(StatusView::Revision);
    store.load().await.unwrap();

    store.remove("9").await.unwrap();
    assert!(h.blobs.keys().is_empty());
    assert!(h.svc.record("9").is_none());
    assert!(store.snapshot().records.is_empty());
}

#[tokio::test]
async fn remove_proceeds_when_blob_deletes_fail() {
    let h = Harness::signed_in().await;
    h.seed_with_files("9", Status::Queued, &["user-a/1_a.png"], &[]);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();
    h.blobs.fail_deletes(true);

    store.remove("9").await.unwrap();
    assert!(h.svc.record("9").is_none());
    assert_eq!(h.blobs.delete_calls(), 1);
}

#[tokio::test]
async fn failed_row_delete_keeps_local_entry() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Queued, "user-a", 0);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();
    h.svc.fail(MemoryOp::Delete);

    let err = store.remove("1").await.unwrap_err();
    assert!(matches!(err, SyncError::DeleteFailed(_)));
    assert_eq!(ids(&store.snapshot().records), vec!["1"]);
}

#[tokio::test]
async fn failed_update_leaves_list_untouched() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Revision, "user-a", 0);
    let store = h.store(StatusView::Revision);
    store.load().await.unwrap();
    let before = store.snapshot();
    h.svc.fail(MemoryOp::Update);

    let err = store.approve("1").await.unwrap_err();
    assert!(matches!(err, SyncError::UpdateFailed(_)));
    assert_eq!(*store.snapshot(), *before);
}

#[tokio::test]
async fn submit_uploads_in_order_and_prepends() {
    let h = Harness::signed_in().await;
    h.seed("1", "Older", Status::Queued, "user-a", 0);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();
    let mut rx = store.subscribe();
    rx.borrow_and_update();

    let record = store
        .submit(NewDesign {
            client_name: "  Kopi Kenangan  ".into(),
            briefing_date: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
            briefing_text: "logo baru".into(),
            files: vec![LocalFile::new("ref1.png", "1"), LocalFile::new("ref2.jpg", "2")],
        })
        .await
        .unwrap();

    assert_eq!(record.client_name, "Kopi Kenangan");
    assert_eq!(record.status, Status::Queued);
    assert_eq!(record.owner_user_id, "user-a");
    assert!(record.reference_files[0].ends_with("_ref1.png"));
    assert!(record.reference_files[1].ends_with("_ref2.jpg"));
    for url in &record.reference_files {
        let key = h.blobs.key_for_public_url(url).unwrap();
        assert!(key.starts_with("user-a/"));
    }
    let second = h.blobs.key_for_public_url(&record.reference_files[1]).unwrap();
    assert_eq!(h.blobs.content_type(&second).as_deref(), Some("image/jpeg"));

    assert!(rx.has_changed().unwrap());
    assert_eq!(ids(&rx.borrow_and_update().records), vec![record.id.as_str(), "1"]);
}

#[tokio::test]
async fn submit_validation_and_upload_failure_insert_nothing() {
    let h = Harness::signed_in().await;
    let store = h.store(StatusView::New);

    let err = store
        .submit(NewDesign {
            client_name: "   ".into(),
            briefing_date: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
            briefing_text: String::new(),
            files: vec![LocalFile::new("ref1.png", "1")],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(_)));
    assert_eq!(h.blobs.put_calls(), 0);

    h.blobs.fail_uploads_named("ref2.png");
    let err = store
        .submit(NewDesign {
            client_name: "Kopi".into(),
            briefing_date: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
            briefing_text: String::new(),
            files: vec![LocalFile::new("ref1.png", "1"), LocalFile::new("ref2.png", "2")],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UploadFailed { .. }));
    assert_eq!(h.svc.create_calls(), 0);
    assert!(h.blobs.keys().is_empty());
}

#[tokio::test]
async fn submit_rejects_non_image_files() {
    let h = Harness::signed_in().await;
    let store = h.store(StatusView::New);

    let err = store
        .submit(NewDesign {
            client_name: "Kopi".into(),
            briefing_date: NaiveDate::from_ymd_opt(2025, 9, 2).unwrap(),
            briefing_text: "brief".into(),
            files: vec![LocalFile::new("ref1.png", "1"), LocalFile::new("brief.pdf", "2")],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(ref msg) if msg.contains("brief.pdf")));
    assert_eq!(h.blobs.put_calls(), 0);
    assert_eq!(h.svc.create_calls(), 0);
}

#[tokio::test]
async fn identity_change_clears_view() {
    let h = Harness::signed_in().await;
    h.seed("1", "A", Status::Queued, "user-a", 0);
    let store = h.store(StatusView::New);
    store.load().await.unwrap();

    h.gate.sign_in("b@example.com", "secret2").await.unwrap();
    let err = store
        .commit(
            "1",
            RecordPatch {
                status: Some(Status::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UpdateFailed(_)));
    assert!(store.snapshot().records.is_empty());
    assert_eq!(h.svc.update_calls(), 0);

    assert!(store.load().await.unwrap().is_empty());
    assert_eq!(store.snapshot().owner.as_deref(), Some("user-b"));
}

#[tokio::test]
async fn request_goes_from_submission_to_done() {
    let h = Harness::signed_in().await;
    let new = h.store(StatusView::New);
    let revision = h.store(StatusView::Revision);
    let done = h.store(StatusView::Done);

    let record = new
        .submit(NewDesign {
            client_name: "Bakso Pak Kumis".into(),
            briefing_date: NaiveDate::from_ymd_opt(2025, 9, 3).unwrap(),
            briefing_text: "spanduk 3x1".into(),
            files: vec![LocalFile::new("foto.jpg", "jpg")],
        })
        .await
        .unwrap();

    // Designer side: start work, then post results for review.
    for status in [Status::InProgress, Status::Revision] {
        h.svc
            .update_record(
                &record.id,
                &RecordPatch {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    h.svc
        .update_record(
            &record.id,
            &RecordPatch {
                result_files: Some(vec![h.blobs.seed("designer/5_spanduk.png", "png")]),
                result_seen: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(new.load().await.unwrap().is_empty());
    let pending = revision.load().await.unwrap();
    assert_eq!(ids(&pending), vec![record.id.as_str()]);
    assert!(!pending[0].result_seen);

    revision.mark_result_seen(&record.id).await.unwrap();
    let mut edit = revision.begin_edit(&record.id).unwrap();
    edit.briefing_text = "spanduk 3x1, font lebih besar".into();
    let revised = revision.save_edit(edit).await.unwrap().unwrap();
    assert!(!revised.briefing_seen);
    assert_eq!(revised.status, Status::Revision);

    // Designer addresses the revision and the client approves.
    h.svc
        .update_record(
            &record.id,
            &RecordPatch {
                briefing_seen: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    revision.load().await.unwrap();
    let approved = revision.approve(&record.id).await.unwrap();
    assert_eq!(approved.status, Status::Done);
    assert!(approved.briefing_seen);
    assert!(approved.result_seen);

    assert_eq!(ids(&done.load().await.unwrap()), vec![record.id.as_str()]);
    assert!(revision.load().await.unwrap().is_empty());
}
