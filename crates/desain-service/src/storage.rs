use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use desain_store::{
    encode_key, join_public_url, key_after_bucket, strip_public_base, ObjectStore,
    StoreError,
};
use reqwest::{Method, StatusCode};
use tracing::debug;

use crate::http::{parse_error, send, SupabaseClient};
use crate::ServiceError;

/// Supabase Storage over its REST API, authenticated with the same
/// session as the record calls.
pub struct SupabaseStorage {
    client: Arc<SupabaseClient>,
    bucket: String,
    public_base: String,
}

impl SupabaseStorage {
    pub(crate) fn new(client: Arc<SupabaseClient>, bucket: &str) -> Self {
        let public_base = format!("{}/storage/v1/object/public/{bucket}", client.base_url);
        Self {
            client,
            bucket: bucket.to_string(),
            public_base,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_path(&self, key: &str) -> String {
        format!("/storage/v1/object/{}/{}", self.bucket, encode_key(key))
    }
}

fn to_store_error(err: ServiceError) -> StoreError {
    match err {
        ServiceError::NotFound(msg) => StoreError::NotFound(msg),
        other => StoreError::Internal(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StoreError> {
        let len = data.len();
        let builder = self
            .client
            .request(Method::POST, &self.object_path(key))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(data);
        let resp = send(builder).await.map_err(to_store_error)?;
        if !resp.status().is_success() {
            return Err(to_store_error(parse_error(resp).await));
        }
        debug!(bucket = %self.bucket, key, bytes = len, "uploaded object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let builder = self.client.request(Method::GET, &self.object_path(key));
        let resp = send(builder).await.map_err(to_store_error)?;
        let status = resp.status();
        if status.is_success() {
            return resp
                .bytes()
                .await
                .map_err(|e| StoreError::Internal(format!("read body: {e}")));
        }
        // Storage reports missing objects as 400 with a "not found" body.
        match parse_error(resp).await {
            ServiceError::NotFound(_) => Err(StoreError::NotFound(key.to_string())),
            err if status == StatusCode::BAD_REQUEST
                && err.to_string().to_lowercase().contains("not found") =>
            {
                Err(StoreError::NotFound(key.to_string()))
            }
            err => Err(to_store_error(err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.delete_many(&[key.to_string()]).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let builder = self
            .client
            .request(Method::DELETE, &format!("/storage/v1/object/{}", self.bucket))
            .json(&serde_json::json!({ "prefixes": keys }));
        let resp = send(builder).await.map_err(to_store_error)?;
        if !resp.status().is_success() {
            return Err(to_store_error(parse_error(resp).await));
        }
        debug!(bucket = %self.bucket, count = keys.len(), "deleted objects");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_public_url(&self.public_base, key)
    }

    fn key_for_public_url(&self, url: &str) -> Option<String> {
        strip_public_base(&self.public_base, url).or_else(|| key_after_bucket(url, &self.bucket))
    }
}
