use std::sync::Arc;

use desain_core::record::{
    CreateRecord, DesignRecord, RecordFilter, RecordPatch, Status, StatusView,
};
use desain_core::session::UserIdentity;
use desain_core::{apply_local_filter, guard_patch};
use desain_service::RecordService;
use desain_store::ObjectStore;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::edit::{NewDesign, RecordEdit};
use crate::staging::{discard, AttachmentStaging};
use crate::{SessionGate, SyncError};

/// What a [`RecordStore`] currently shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordView {
    /// The user the records were loaded for.
    pub owner: Option<String>,
    /// Newest first, as loaded.
    pub records: Vec<DesignRecord>,
}

/// One status view over the signed-in user's records.
///
/// The list only changes after the backend confirms a call; each change is
/// published whole to subscribers.
pub struct RecordStore {
    view: StatusView,
    service: Arc<dyn RecordService>,
    blobs: Arc<dyn ObjectStore>,
    gate: Arc<SessionGate>,
    state: watch::Sender<Arc<RecordView>>,
}

impl RecordStore {
    pub fn new(
        view: StatusView,
        service: Arc<dyn RecordService>,
        blobs: Arc<dyn ObjectStore>,
        gate: Arc<SessionGate>,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(RecordView::default()));
        Self {
            view,
            service,
            blobs,
            gate,
            state,
        }
    }

    pub fn view(&self) -> StatusView {
        self.view
    }

    pub fn snapshot(&self) -> Arc<RecordView> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RecordView>> {
        self.state.subscribe()
    }

    /// The current list narrowed by a client-name search.
    pub fn filtered(&self, query: &str) -> Vec<DesignRecord> {
        let snapshot = self.snapshot();
        apply_local_filter(&snapshot.records, query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The signed-in user. Drops a view that belongs to someone else.
    fn identity(&self) -> Result<UserIdentity, SyncError> {
        let user = self.gate.require_user()?;
        let stale = self
            .state
            .borrow()
            .owner
            .as_ref()
            .is_some_and(|owner| *owner != user.id);
        if stale {
            debug!(view = %self.view, "identity changed, clearing view");
            self.state.send_replace(Arc::new(RecordView::default()));
        }
        Ok(user)
    }

    fn find(&self, id: &str) -> Option<DesignRecord> {
        self.state.borrow().records.iter().find(|r| r.id == id).cloned()
    }

    pub async fn load(&self) -> Result<Vec<DesignRecord>, SyncError> {
        let user = self.identity()?;
        let filter = RecordFilter::for_view(self.view, Some(user.id.clone()));
        debug!(view = %self.view, user = %user.id, "loading records");
        let records = self.service.list_records(&filter).await.map_err(|e| {
            warn!(view = %self.view, "load failed: {e}");
            SyncError::FetchFailed(e.to_string())
        })?;
        info!(view = %self.view, count = records.len(), "records loaded");
        self.state.send_replace(Arc::new(RecordView {
            owner: Some(user.id),
            records: records.clone(),
        }));
        Ok(records)
    }

    /// Guard `patch` against the record's status, send it and swap the
    /// confirmed row into place.
    pub async fn commit(&self, id: &str, patch: RecordPatch) -> Result<DesignRecord, SyncError> {
        self.identity()?;
        let current = self
            .find(id)
            .ok_or_else(|| SyncError::UpdateFailed(format!("record {id} is not in this view")))?;
        let patch = guard_patch(&current, patch)?;
        if patch.is_empty() {
            return Ok(current);
        }
        debug!(id, ?patch, "updating record");
        let updated = self.service.update_record(id, &patch).await.map_err(|e| {
            warn!(id, "update failed: {e}");
            SyncError::UpdateFailed(e.to_string())
        })?;
        self.state.send_modify(|view| {
            let view = Arc::make_mut(view);
            if let Some(slot) = view.records.iter_mut().find(|r| r.id == id) {
                *slot = updated.clone();
            }
        });
        info!(id, status = %updated.status, "record updated");
        Ok(updated)
    }

    /// Delete the record's attachments (best-effort), then the row.
    pub async fn remove(&self, id: &str) -> Result<(), SyncError> {
        self.identity()?;
        let current = self
            .find(id)
            .ok_or_else(|| SyncError::DeleteFailed(format!("record {id} is not in this view")))?;

        let keys: Vec<String> = current
            .attachment_urls()
            .filter_map(|url| {
                let key = self.blobs.key_for_public_url(url);
                if key.is_none() {
                    warn!(id, url, "attachment URI does not map to a stored key, skipping");
                }
                key
            })
            .collect();
        let results = join_all(keys.iter().map(|key| self.blobs.delete(key))).await;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                warn!(id, key = %key, "failed to delete attachment: {e}");
            }
        }

        debug!(id, "deleting record");
        self.service.delete_record(id).await.map_err(|e| {
            warn!(id, "delete failed: {e}");
            SyncError::DeleteFailed(e.to_string())
        })?;
        self.state.send_modify(|view| {
            Arc::make_mut(view).records.retain(|r| r.id != id);
        });
        info!(id, "record deleted");
        Ok(())
    }

    /// Upload the files and insert a queued record owned by the signed-in
    /// user. Nothing is inserted if an upload fails.
    pub async fn submit(&self, design: NewDesign) -> Result<DesignRecord, SyncError> {
        let user = self.identity()?;
        let mut input = CreateRecord {
            client_name: design.client_name.trim().to_string(),
            briefing_date: design.briefing_date,
            briefing_text: design.briefing_text,
            owner_user_id: user.id.clone(),
            reference_files: Vec::new(),
            status: Status::Queued,
        };
        input.validate()?;

        let mut staging = AttachmentStaging::new(Vec::new());
        for file in design.files {
            staging.stage_add(file);
        }
        input.reference_files = staging.resolve(self.blobs.as_ref(), &user.id).await?;

        debug!(client = %input.client_name, files = input.reference_files.len(), "creating record");
        let record = match self.service.create_record(&input).await {
            Ok(record) => record,
            Err(e) => {
                warn!("create failed: {e}");
                let keys: Vec<String> = input
                    .reference_files
                    .iter()
                    .filter_map(|url| self.blobs.key_for_public_url(url))
                    .collect();
                discard(self.blobs.as_ref(), &keys).await;
                return Err(SyncError::UpdateFailed(e.to_string()));
            }
        };
        if self.view.includes(record.status) {
            self.state.send_modify(|view| {
                Arc::make_mut(view).records.insert(0, record.clone());
            });
        }
        info!(id = %record.id, client = %record.client_name, "record created");
        Ok(record)
    }

    /// Accept the posted results.
    pub async fn approve(&self, id: &str) -> Result<DesignRecord, SyncError> {
        self.commit(
            id,
            RecordPatch {
                status: Some(Status::Done),
                ..Default::default()
            },
        )
        .await
    }

    /// Clear the "new results" marker.
    pub async fn mark_result_seen(&self, id: &str) -> Result<DesignRecord, SyncError> {
        self.identity()?;
        let current = self
            .find(id)
            .ok_or_else(|| SyncError::UpdateFailed(format!("record {id} is not in this view")))?;
        if current.result_seen {
            return Ok(current);
        }
        self.commit(
            id,
            RecordPatch {
                result_seen: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    pub fn begin_edit(&self, id: &str) -> Result<RecordEdit, SyncError> {
        self.identity()?;
        self.find(id)
            .map(|record| RecordEdit::for_record(&record))
            .ok_or_else(|| SyncError::UpdateFailed(format!("record {id} is not in this view")))
    }

    /// Resolve staged attachments and commit the changed fields. `None`
    /// when there was nothing to save.
    pub async fn save_edit(&self, edit: RecordEdit) -> Result<Option<DesignRecord>, SyncError> {
        let user = self.identity()?;
        if edit.is_noop() {
            return Ok(None);
        }
        let id = edit.record_id();
        if self.find(id).is_none() {
            return Err(SyncError::UpdateFailed(format!(
                "record {id} is not in this view"
            )));
        }
        let files = if edit.attachments.has_changes() {
            Some(
                edit.attachments
                    .resolve(self.blobs.as_ref(), &user.id)
                    .await?,
            )
        } else {
            None
        };
        self.commit(id, edit.patch(files)).await.map(Some)
    }
}
