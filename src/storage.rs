//! Object storage for meal photos.
//!
//! Photos go to an S3-compatible bucket under a per-user prefix; the stored
//! key is kept on the meal row so deleting the meal can clean up the object.

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;

/// A stored photo: the object key and its public URL
#[derive(Debug, Clone)]
pub struct StoredPhoto {
    pub key: String,
    pub url: String,
}

/// S3-backed photo storage
#[derive(Debug, Clone)]
pub struct PhotoStorage {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl PhotoStorage {
    /// Build a client for the configured S3-compatible endpoint
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let base = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "nutrilog",
        );
        let s3_config = aws_sdk_s3::config::Builder::from(&base)
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        info!(
            endpoint = %config.endpoint_url,
            bucket = %config.bucket,
            "Photo storage client initialized"
        );

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.clone(),
        })
    }

    /// Upload a meal photo and return its key and public URL
    pub async fn upload_photo(&self, user_id: i64, bytes: Vec<u8>) -> Result<StoredPhoto> {
        let key = photo_key(user_id);
        debug!(user_id = %user_id, key = %key, size = bytes.len(), "Uploading meal photo");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("image/jpeg")
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .context("Failed to upload photo to object storage")?;

        let url = object_url(&self.public_base_url, &self.bucket, &key);
        Ok(StoredPhoto { key, url })
    }

    /// Delete a previously uploaded photo
    pub async fn delete_photo(&self, key: &str) -> Result<()> {
        debug!(key = %key, "Deleting meal photo");

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to delete photo from object storage")?;

        Ok(())
    }

    /// Public URL for a stored object key
    pub fn public_url(&self, key: &str) -> String {
        object_url(&self.public_base_url, &self.bucket, key)
    }
}

/// Object key for a new photo upload
fn photo_key(user_id: i64) -> String {
    format!("user_uploads/{}/image_{}.jpg", user_id, Uuid::new_v4())
}

/// Path-style public URL for an object
fn object_url(public_base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", public_base.trim_end_matches('/'), bucket, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_key_shape() {
        let key = photo_key(42);
        assert!(key.starts_with("user_uploads/42/image_"));
        assert!(key.ends_with(".jpg"));
    }

    #[test]
    fn test_photo_keys_are_unique() {
        assert_ne!(photo_key(42), photo_key(42));
    }

    #[test]
    fn test_object_url_joins_cleanly() {
        let url = object_url("https://s3.example.com/", "meals", "user_uploads/1/image_x.jpg");
        assert_eq!(
            url,
            "https://s3.example.com/meals/user_uploads/1/image_x.jpg"
        );
    }
}
