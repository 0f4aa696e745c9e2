//! Artifact storage port.

use crate::build::domain::StoredFile;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Result type for artifact storage operations.
pub type ArtifactVaultResult<T> = Result<T, ArtifactVaultError>;

/// Destination for build outputs.
#[async_trait]
pub trait ArtifactVault: Send + Sync {
    /// Copies `source` into storage as `file_name`, hashing its content.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactVaultError::SourceMissing`] when `source` does not
    /// exist and [`ArtifactVaultError::Io`] for copy failures.
    async fn store(&self, source: &Utf8Path, file_name: &str) -> ArtifactVaultResult<StoredFile>;
}

/// Errors returned by artifact storage.
#[derive(Debug, Clone, Error)]
pub enum ArtifactVaultError {
    /// The expected output file does not exist.
    #[error("expected output file not found: {0}")]
    SourceMissing(Utf8PathBuf),

    /// Storage I/O failure.
    #[error("artifact storage error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl ArtifactVaultError {
    /// Wraps an I/O error.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }
}
