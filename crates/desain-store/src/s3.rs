use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use s3::Bucket;

use crate::{
    join_public_url, key_after_bucket, strip_public_base, ObjectStore,
    StoreConfig, StoreError,
};

/// S3-compatible store. Supabase Storage exposes the same bucket over its
/// S3 endpoint, so this talks to the hosted bucket directly.
pub struct S3Store {
    bucket: Box<Bucket>,
    bucket_name: String,
    public_base: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket_name)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let endpoint = config
            .endpoint_url
            .clone()
            .ok_or_else(|| StoreError::Internal("endpoint url required".into()))?;
        let region = Region::Custom {
            region: config.region.clone().unwrap_or_else(|| "us-east-1".into()),
            endpoint: endpoint.clone(),
        };

        let credentials = Credentials::new(
            config.access_key_id.as_deref(),
            config.secret_access_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StoreError::Internal(format!("credentials: {e}")))?;

        let bucket_name = config.bucket_name().to_string();
        let mut bucket = Bucket::new(&bucket_name, region, credentials)
            .map_err(|e| StoreError::Internal(format!("bucket: {e}")))?;
        bucket.set_path_style();

        let public_base = config.public_base_url.clone().unwrap_or_else(|| {
            format!("{}/{bucket_name}", endpoint.trim_end_matches('/'))
        });

        Ok(Self {
            bucket,
            bucket_name,
            public_base,
        })
    }
}

fn map_s3_error(e: S3Error) -> StoreError {
    StoreError::Internal(format!("s3: {e}"))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StoreError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(map_s3_error)?;
        if response.status_code() >= 400 {
            return Err(StoreError::Internal(format!(
                "s3 put {}: status {}",
                key,
                response.status_code()
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let response = self.bucket.get_object(key).await.map_err(map_s3_error)?;
        if response.status_code() == 404 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if response.status_code() >= 400 {
            return Err(StoreError::Internal(format!(
                "s3 get {}: status {}",
                key,
                response.status_code()
            )));
        }
        Ok(Bytes::from(response.to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.bucket.delete_object(key).await.map_err(map_s3_error)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let response = self.bucket.get_object(key).await.map_err(map_s3_error)?;
        Ok(response.status_code() != 404)
    }

    fn public_url(&self, key: &str) -> String {
        join_public_url(&self.public_base, key)
    }

    fn key_for_public_url(&self, url: &str) -> Option<String> {
        strip_public_base(&self.public_base, url)
            .or_else(|| key_after_bucket(url, &self.bucket_name))
    }
}
