use std::fmt;

use chrono::Utc;

use super::error::StorageError;

/// Relative, traversal-free path of a stored image.
///
/// Keys look like `users/{user_id}/runs/{run_id}/{timestamp}_{random}.{ext}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    /// Fresh collision-avoiding key in the directory of a run.
    pub fn for_run(user_id: i32, run_id: i32, extension: &str) -> Self {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "users/{user_id}/runs/{run_id}/{stamp}_{}.{}",
            &random[..12],
            extension.to_ascii_lowercase()
        ))
    }

    /// Validate an existing key read back from storage metadata.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let invalid = |msg: &str| Err(StorageError::InvalidKey(format!("{msg}: {raw}")));

        if raw.is_empty() || raw.len() > 512 {
            return invalid("key must be 1-512 characters");
        }
        if raw.starts_with('/') || raw.ends_with('/') {
            return invalid("key must be relative");
        }
        for segment in raw.split('/') {
            if segment.is_empty() || segment.starts_with('.') {
                return invalid("empty or hidden path segment");
            }
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'))
        {
            return invalid("key contains invalid characters");
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
