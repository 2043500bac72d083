//! On-disk storage for session artifacts.
//!
//! Sketches land in the upload directory and results in the result
//! directory, both named `{session_id}_{millis}_{suffix}.png`. All file I/O
//! goes through `tokio::fs`, which runs on the runtime's bounded blocking
//! pool so the async workers never stall on disk.

use std::io;
use std::path::{Path, PathBuf};

use sketchflow_core::error::CoreError;

use crate::config::StorageConfig;
use crate::session::Session;

/// Writes and deletes sketch and result files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    upload_dir: PathBuf,
    result_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(upload_dir: impl Into<PathBuf>, result_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            result_dir: result_dir.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.upload_dir, &config.result_dir)
    }

    /// Create both directories if they are missing.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.result_dir).await
    }

    /// Persist a sketch revision and return its path.
    pub async fn save_sketch(&self, session_id: &str, bytes: &[u8]) -> Result<PathBuf, CoreError> {
        write_artifact(&self.upload_dir, session_id, bytes).await
    }

    /// Persist a generated (or client-provided) result and return its path.
    pub async fn save_result(&self, session_id: &str, bytes: &[u8]) -> Result<PathBuf, CoreError> {
        write_artifact(&self.result_dir, session_id, bytes).await
    }

    /// Save a sketch and make it the session's current revision.
    ///
    /// If the session was retired meanwhile the file is deleted again and
    /// `SessionNotFound` is returned.
    pub async fn attach_sketch(
        &self,
        session: &Session,
        bytes: &[u8],
    ) -> Result<PathBuf, CoreError> {
        let path = self.save_sketch(session.id(), bytes).await?;
        if let Err(e) = session.set_sketch(path.clone()).await {
            self.delete_best_effort(session.id(), std::slice::from_ref(&path)).await;
            return Err(e);
        }
        Ok(path)
    }

    /// Save an image handed back by the client as the session's result.
    /// Same retire handling as [`ArtifactStore::attach_sketch`].
    pub async fn attach_result(
        &self,
        session: &Session,
        bytes: &[u8],
    ) -> Result<PathBuf, CoreError> {
        let path = self.save_result(session.id(), bytes).await?;
        if let Err(e) = session.set_result(path.clone()).await {
            self.delete_best_effort(session.id(), std::slice::from_ref(&path)).await;
            return Err(e);
        }
        Ok(path)
    }

    /// Read a stored artifact. A missing file is [`CoreError::ResultMissing`].
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, CoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CoreError::ResultMissing(
                format!("{} no longer exists", path.display()),
            )),
            Err(e) => Err(CoreError::Internal(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Delete artifacts, logging failures instead of returning them.
    ///
    /// Returns the number of files actually removed.
    pub async fn delete_best_effort(&self, session_id: &str, paths: &[PathBuf]) -> usize {
        let mut removed = 0;
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(session_id, path = %path.display(), "Artifact already gone");
                }
                Err(e) => {
                    tracing::warn!(
                        session_id,
                        path = %path.display(),
                        error = %e,
                        "Failed to delete session artifact",
                    );
                }
            }
        }
        removed
    }
}

async fn write_artifact(dir: &Path, session_id: &str, bytes: &[u8]) -> Result<PathBuf, CoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CoreError::Internal(format!("Failed to create {}: {e}", dir.display())))?;

    let stamp = chrono::Utc::now().timestamp_millis();
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let path = dir.join(format!("{session_id}_{stamp}_{suffix}.png"));

    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| CoreError::Internal(format!("Failed to write {}: {e}", path.display())))?;
    Ok(path)
}
