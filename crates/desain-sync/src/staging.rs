use chrono::Utc;
use desain_core::attachment::LocalFile;
use desain_store::{upload_key, ObjectStore};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::SyncError;

/// Pending attachment changes for one record field.
///
/// Nothing touches the blob store until [`AttachmentStaging::resolve`].
#[derive(Debug, Clone, Default)]
pub struct AttachmentStaging {
    persisted: Vec<String>,
    pending_removals: Vec<String>,
    pending_adds: Vec<LocalFile>,
}

impl AttachmentStaging {
    pub fn new(persisted: Vec<String>) -> Self {
        Self {
            persisted,
            ..Default::default()
        }
    }

    pub fn persisted(&self) -> &[String] {
        &self.persisted
    }

    pub fn pending_removals(&self) -> &[String] {
        &self.pending_removals
    }

    pub fn pending_adds(&self) -> &[LocalFile] {
        &self.pending_adds
    }

    pub fn stage_add(&mut self, file: LocalFile) {
        self.pending_adds.push(file);
    }

    /// Mark a persisted URI for deletion. False if the URI is unknown or
    /// already staged.
    pub fn stage_remove(&mut self, uri: &str) -> bool {
        if !self.persisted.iter().any(|p| p == uri)
            || self.pending_removals.iter().any(|p| p == uri)
        {
            return false;
        }
        self.pending_removals.push(uri.to_string());
        true
    }

    pub fn unstage_add(&mut self, file: &LocalFile) -> bool {
        match self.pending_adds.iter().position(|f| f == file) {
            Some(pos) => {
                self.pending_adds.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn unstage_remove(&mut self, uri: &str) -> bool {
        match self.pending_removals.iter().position(|p| p == uri) {
            Some(pos) => {
                self.pending_removals.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Persisted URIs that survive the staged removals.
    pub fn effective(&self) -> Vec<&str> {
        self.persisted
            .iter()
            .filter(|p| !self.pending_removals.contains(*p))
            .map(String::as_str)
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending_adds.is_empty() || !self.pending_removals.is_empty()
    }

    /// Apply the staged changes to the blob store and return the final URI
    /// list: survivors in their original order, then new uploads in the
    /// order they were staged.
    ///
    /// Staged files that are not images fail with `InvalidInput` before the
    /// store is touched. Removals are best-effort and run first. Uploads run
    /// one at a time; the first failure aborts with `UploadFailed` after
    /// cleaning up the blobs this call already wrote. Removals are not
    /// rolled back.
    pub async fn resolve(
        &self,
        store: &dyn ObjectStore,
        owner_user_id: &str,
    ) -> Result<Vec<String>, SyncError> {
        if let Some(file) = self.pending_adds.iter().find(|f| !f.is_image()) {
            return Err(SyncError::InvalidInput(format!(
                "{} is not an image file",
                file.name
            )));
        }

        let removals = self.pending_removals.iter().filter_map(|uri| {
            let Some(key) = store.key_for_public_url(uri) else {
                warn!(uri = %uri, "attachment URI does not map to a stored key, skipping");
                return None;
            };
            Some(async move {
                let result = store.delete(&key).await;
                (key, result)
            })
        });
        for (key, result) in join_all(removals).await {
            match result {
                Ok(()) => debug!(key = %key, "deleted attachment"),
                Err(e) => warn!(key = %key, "failed to delete attachment: {e}"),
            }
        }

        let mut uploaded: Vec<String> = Vec::with_capacity(self.pending_adds.len());
        let mut last_ts = i64::MIN;
        for file in &self.pending_adds {
            let now = Utc::now().timestamp_millis();
            let ts = if now > last_ts { now } else { last_ts + 1 };
            last_ts = ts;

            let key = upload_key(owner_user_id, ts, &file.name);
            let content_type = file.content_type.as_deref().unwrap_or("application/octet-stream");
            debug!(key = %key, bytes = file.size(), content_type, "uploading attachment");
            if let Err(e) = store.put(&key, file.data.clone(), content_type).await {
                warn!(file = %file.name, "upload failed: {e}");
                discard(store, &uploaded).await;
                return Err(SyncError::UploadFailed {
                    file: file.name.clone(),
                    reason: e.to_string(),
                });
            }
            uploaded.push(key);
        }
        if !uploaded.is_empty() {
            info!(count = uploaded.len(), "uploaded attachments");
        }

        let mut uris: Vec<String> = self.effective().into_iter().map(String::from).collect();
        uris.extend(uploaded.iter().map(|key| store.public_url(key)));
        Ok(uris)
    }
}

/// Best-effort delete of blobs nobody will reference.
pub(crate) async fn discard(store: &dyn ObjectStore, keys: &[String]) {
    let results = join_all(keys.iter().map(|key| store.delete(key))).await;
    for (key, result) in keys.iter().zip(results) {
        if let Err(e) = result {
            warn!(key = %key, "failed to clean up orphaned upload: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use desain_service::memory::MemoryObjectStore;

    use super::*;

    fn staged_with(store: &MemoryObjectStore, keys: &[&str]) -> AttachmentStaging {
        AttachmentStaging::new(keys.iter().map(|k| store.seed(k, "old")).collect())
    }

    #[tokio::test]
    async fn stage_then_unstage_restores_state() {
        let store = MemoryObjectStore::new();
        let mut staging = staged_with(&store, &["user-a/1_a.png", "user-a/2_b.png"]);
        let before = staging.effective().iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let file = LocalFile::new("c.png", "c");
        staging.stage_add(file.clone());
        assert!(staging.stage_remove(&before[0]));
        assert!(!staging.stage_remove(&before[0]), "already staged");
        assert!(!staging.stage_remove("memory://desain-files/unknown.png"));
        assert_eq!(staging.effective(), vec![before[1].as_str()]);
        assert!(staging.has_changes());

        assert!(staging.unstage_add(&file));
        assert!(staging.unstage_remove(&before[0]));
        assert!(!staging.unstage_remove(&before[0]));
        assert!(!staging.has_changes());
        assert_eq!(staging.effective(), before.iter().map(String::as_str).collect::<Vec<_>>());

        let fresh = AttachmentStaging::new(staging.persisted().to_vec());
        let round_tripped = staging.resolve(&store, "user-a").await.unwrap();
        let untouched = fresh.resolve(&store, "user-a").await.unwrap();
        assert_eq!(round_tripped, untouched);
        assert_eq!(round_tripped, before);
        assert_eq!(store.put_calls(), 0);
        assert_eq!(store.delete_calls(), 0);
        assert_eq!(store.keys().len(), 2);
    }

    #[tokio::test]
    async fn non_image_files_are_rejected_before_any_store_call() {
        let store = MemoryObjectStore::new();
        let mut staging = staged_with(&store, &["user-a/1_a.png"]);
        let uri = staging.persisted()[0].clone();
        staging.stage_remove(&uri);
        staging.stage_add(LocalFile::new("logo.png", "png"));
        staging.stage_add(LocalFile::new("brief.pdf", "pdf"));

        let err = staging.resolve(&store, "user-a").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(ref msg) if msg.contains("brief.pdf")));
        assert_eq!(store.put_calls(), 0);
        assert_eq!(store.delete_calls(), 0);
        assert!(store.contains("user-a/1_a.png"));
    }

    #[tokio::test]
    async fn uploads_carry_the_file_content_type() {
        let store = MemoryObjectStore::new();
        let mut staging = AttachmentStaging::new(Vec::new());
        staging.stage_add(LocalFile::new("sketch.webp", "w"));

        let uris = staging.resolve(&store, "user-a").await.unwrap();
        let key = store.key_for_public_url(&uris[0]).unwrap();
        assert_eq!(store.content_type(&key).as_deref(), Some("image/webp"));
    }

    #[tokio::test]
    async fn resolve_removes_then_appends_in_order() {
        let store = MemoryObjectStore::new();
        let mut staging = staged_with(&store, &["user-a/1_a.png", "user-a/2_b.png"]);
        let removed = staging.persisted()[0].clone();
        staging.stage_remove(&removed);
        staging.stage_add(LocalFile::new("c.png", "c"));
        staging.stage_add(LocalFile::new("c.png", "c again"));

        let uris = staging.resolve(&store, "user-a").await.unwrap();
        assert_eq!(uris.len(), 3);
        assert_eq!(uris[0], staging.persisted()[1]);
        assert!(!store.contains("user-a/1_a.png"));

        // Same file name twice still lands under distinct keys.
        let k1 = store.key_for_public_url(&uris[1]).unwrap();
        let k2 = store.key_for_public_url(&uris[2]).unwrap();
        assert_ne!(k1, k2);
        assert!(k1.starts_with("user-a/") && k1.ends_with("_c.png"));
        assert_eq!(store.get(&k2).await.unwrap().as_ref(), b"c again");
    }

    #[tokio::test]
    async fn failed_upload_stops_and_cleans_up() {
        let store = MemoryObjectStore::new();
        store.fail_uploads_named("b.png");
        let mut staging = AttachmentStaging::new(Vec::new());
        staging.stage_add(LocalFile::new("a.png", "a"));
        staging.stage_add(LocalFile::new("b.png", "b"));
        staging.stage_add(LocalFile::new("c.png", "c"));

        let err = staging.resolve(&store, "user-a").await.unwrap_err();
        assert!(matches!(err, SyncError::UploadFailed { ref file, .. } if file == "b.png"));
        assert_eq!(store.put_calls(), 2, "c.png is never attempted");
        assert!(store.keys().is_empty(), "a.png was cleaned up");
    }

    #[tokio::test]
    async fn removal_failures_are_not_fatal() {
        let store = MemoryObjectStore::new();
        let foreign = "https://elsewhere.example.com/x.png".to_string();
        let mut staging = AttachmentStaging::new(vec![store.seed("user-a/1_a.png", "old"), foreign.clone()]);
        let uri = staging.persisted()[0].clone();
        assert!(staging.stage_remove(&uri));
        assert!(staging.stage_remove(&foreign));
        store.fail_deletes(true);

        let uris = staging.resolve(&store, "user-a").await.unwrap();
        assert!(uris.is_empty());
        assert_eq!(store.delete_calls(), 1);
    }
}
