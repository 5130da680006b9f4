use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use super::error::StorageError;
use super::key::ImageKey;
use super::traits::ImageStore;

/// Filesystem-backed image store.
///
/// Images live at `{base_path}/{key}`; writes go through `{base_path}/.tmp`
/// and are renamed into place so readers never see partial files.
pub struct FilesystemImageStore {
    base_path: PathBuf,
    public_base_url: String,
    max_size: u64,
}

impl FilesystemImageStore {
    /// Create a new filesystem image store.
    pub async fn new(
        base_path: PathBuf,
        public_base_url: impl Into<String>,
        max_size: u64,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_size,
        })
    }

    fn image_path(&self, key: &ImageKey) -> PathBuf {
        self.base_path.join(key.as_str())
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl ImageStore for FilesystemImageStore {
    async fn put(&self, key: &ImageKey, data: &[u8]) -> Result<(), StorageError> {
        if data.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit: self.max_size,
            });
        }

        let image_path = self.image_path(key);
        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Some(parent) = image_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, &image_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(key = %key, bytes = data.len(), "Stored image");
        Ok(())
    }

    async fn get(&self, key: &ImageKey) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.image_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &ImageKey) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.image_path(key)).await?)
    }

    async fn delete(&self, key: &ImageKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.image_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &ImageKey) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
