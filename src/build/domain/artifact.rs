//! Build output records.

use super::{ArtifactId, TaskDomainError, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercase hex SHA-256 digest of an artifact's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Length of a hex-encoded SHA-256 digest.
    pub const HEX_LEN: usize = 64;

    /// Creates a validated checksum.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidChecksum`] unless the value is 64
    /// lowercase hexadecimal characters.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let is_valid = raw.len() == Self::HEX_LEN
            && raw
                .chars()
                .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch));
        if !is_valid {
            return Err(TaskDomainError::InvalidChecksum(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Checksum {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File placed in artifact storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    /// File name inside the artifact directory.
    pub file_name: String,
    /// Full path of the stored file.
    pub file_path: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Content checksum.
    pub checksum: Checksum,
}

/// Creation payload for an artifact record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtifact {
    /// Producing task.
    pub task_id: TaskId,
    /// Stored file identity.
    pub file: StoredFile,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Single output of a successful task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    id: ArtifactId,
    task_id: TaskId,
    file: StoredFile,
    download_url: String,
    created_at: DateTime<Utc>,
    download_count: u64,
    last_downloaded_at: Option<DateTime<Utc>>,
    is_archived: bool,
    archived_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifact {
    /// Persisted identifier.
    pub id: ArtifactId,
    /// Persisted producing task.
    pub task_id: TaskId,
    /// Persisted file identity.
    pub file: StoredFile,
    /// Persisted download URL.
    pub download_url: String,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted download counter.
    pub download_count: u64,
    /// Persisted last download timestamp.
    pub last_downloaded_at: Option<DateTime<Utc>>,
    /// Persisted archival flag.
    pub is_archived: bool,
    /// Persisted archival timestamp.
    pub archived_at: Option<DateTime<Utc>>,
}

impl Artifact {
    /// Materialises a freshly stored artifact.
    #[must_use]
    pub fn create(id: ArtifactId, new: NewArtifact) -> Self {
        let download_url = format!("/artifacts/{}", new.file.file_name);
        Self {
            id,
            task_id: new.task_id,
            file: new.file,
            download_url,
            created_at: new.created_at,
            download_count: 0,
            last_downloaded_at: None,
            is_archived: false,
            archived_at: None,
        }
    }

    /// Reconstructs an artifact from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedArtifact) -> Self {
        Self {
            id: data.id,
            task_id: data.task_id,
            file: data.file,
            download_url: data.download_url,
            created_at: data.created_at,
            download_count: data.download_count,
            last_downloaded_at: data.last_downloaded_at,
            is_archived: data.is_archived,
            archived_at: data.archived_at,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> ArtifactId {
        self.id
    }

    /// Returns the producing task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the stored file identity.
    #[must_use]
    pub const fn file(&self) -> &StoredFile {
        &self.file
    }

    /// Returns the content checksum.
    #[must_use]
    pub const fn checksum(&self) -> &Checksum {
        &self.file.checksum
    }

    /// Returns the download URL path.
    #[must_use]
    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns how often the artifact was downloaded.
    #[must_use]
    pub const fn download_count(&self) -> u64 {
        self.download_count
    }

    /// Returns the last download timestamp.
    #[must_use]
    pub const fn last_downloaded_at(&self) -> Option<DateTime<Utc>> {
        self.last_downloaded_at
    }

    /// Returns whether housekeeping archived the artifact.
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        self.is_archived
    }

    /// Returns the archival timestamp.
    #[must_use]
    pub const fn archived_at(&self) -> Option<DateTime<Utc>> {
        self.archived_at
    }
}
