use async_trait::async_trait;
use service_core::error::AppError;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::models::StoredFile;

/// An upload as received, before it has been written anywhere.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Keeps only the final path component of the client-supplied name.
    pub fn new(original_filename: Option<&str>, bytes: Vec<u8>) -> Self {
        let original_filename = original_filename
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("unnamed")
            .to_string();

        Self {
            original_filename,
            bytes,
        }
    }

    /// Text after the last `.`, or empty when the name has none. A dotless
    /// name is not echoed back as its own extension.
    pub fn extension(&self) -> &str {
        self.original_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn store(&self, file: &UploadedFile) -> Result<StoredFile, AppError>;
}

/// Writes uploads as `{uuid}_{original_filename}` under one directory.
pub struct LocalFileStore {
    base_path: PathBuf,
}

impl LocalFileStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        let base_path = fs::canonicalize(&base_path).await?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, file: &UploadedFile) -> Result<StoredFile, AppError> {
        let id = Uuid::new_v4();
        let stored_filename = format!("{}_{}", id, file.original_filename);

        // create_dir_all succeeds when the directory already exists, so
        // concurrent uploads cannot trip over each other here.
        fs::create_dir_all(&self.base_path).await?;

        let path = self.base_path.join(&stored_filename);
        fs::write(&path, &file.bytes).await.map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to write upload");
            AppError::from(e)
        })?;

        Ok(StoredFile {
            id: id.to_string(),
            original_filename: file.original_filename.clone(),
            extension: file.extension().to_string(),
            stored_filename,
            stored_path: path.to_string_lossy().to_string(),
            size: file.bytes.len() as i64,
        })
    }
}
