use async_trait::async_trait;

use super::error::StorageError;
use super::key::ImageKey;

/// Storage for uploaded and generated images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store bytes under `key`. Existing content at the key is replaced.
    async fn put(&self, key: &ImageKey, data: &[u8]) -> Result<(), StorageError>;

    /// Retrieve all bytes stored under `key`.
    async fn get(&self, key: &ImageKey) -> Result<Vec<u8>, StorageError>;

    /// Check whether an image exists.
    async fn exists(&self, key: &ImageKey) -> Result<bool, StorageError>;

    /// Delete an image.
    ///
    /// Returns `true` if the image was deleted, `false` if it did not exist.
    async fn delete(&self, key: &ImageKey) -> Result<bool, StorageError>;

    /// Publicly reachable URL of the image.
    fn public_url(&self, key: &ImageKey) -> String;
}
