//! Directory-backed artifact storage.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use sha2::{Digest, Sha256};
use std::io::{ErrorKind, Read, Write};
use tracing::info;

use crate::build::domain::{Checksum, StoredFile};
use crate::build::ports::{ArtifactVault, ArtifactVaultError, ArtifactVaultResult};

const COPY_CHUNK: usize = 64 * 1024;

/// Stores artifacts as plain files under one directory.
#[derive(Debug, Clone)]
pub struct DirArtifactVault {
    root: Utf8PathBuf,
}

impl DirArtifactVault {
    /// Creates a vault rooted at `root`; the directory is created on first
    /// store.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactVault for DirArtifactVault {
    async fn store(&self, source: &Utf8Path, file_name: &str) -> ArtifactVaultResult<StoredFile> {
        let root = self.root.clone();
        let source_path = source.to_owned();
        let name = file_name.to_owned();
        let stored = tokio::task::spawn_blocking(move || copy_and_hash(&root, &source_path, &name))
            .await
            .map_err(ArtifactVaultError::io)??;
        info!(
            file_name = %stored.file_name,
            file_size = stored.file_size,
            checksum = %stored.checksum,
            "artifact stored"
        );
        Ok(stored)
    }
}

fn open_source(source: &Utf8Path) -> ArtifactVaultResult<cap_std::fs_utf8::File> {
    let missing = || ArtifactVaultError::SourceMissing(source.to_owned());
    let file_name = source.file_name().ok_or_else(missing)?;
    let parent = source.parent().unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            missing()
        } else {
            ArtifactVaultError::io(err)
        }
    })?;
    dir.open(file_name).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            missing()
        } else {
            ArtifactVaultError::io(err)
        }
    })
}

fn copy_and_hash(
    root: &Utf8Path,
    source: &Utf8Path,
    file_name: &str,
) -> ArtifactVaultResult<StoredFile> {
    let mut input = open_source(source)?;
    Dir::create_ambient_dir_all(root, ambient_authority()).map_err(ArtifactVaultError::io)?;
    let dest_dir =
        Dir::open_ambient_dir(root, ambient_authority()).map_err(ArtifactVaultError::io)?;
    let mut output = dest_dir.create(file_name).map_err(ArtifactVaultError::io)?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; COPY_CHUNK];
    let mut file_size: u64 = 0;
    loop {
        let read = input.read(&mut buffer).map_err(ArtifactVaultError::io)?;
        let Some(chunk) = buffer.get(..read) else {
            break;
        };
        if chunk.is_empty() {
            break;
        }
        hasher.update(chunk);
        output.write_all(chunk).map_err(ArtifactVaultError::io)?;
        file_size = file_size.saturating_add(u64::try_from(read).unwrap_or(u64::MAX));
    }
    output.flush().map_err(ArtifactVaultError::io)?;

    let checksum = Checksum::new(hex::encode(hasher.finalize())).map_err(ArtifactVaultError::io)?;
    Ok(StoredFile {
        file_name: file_name.to_owned(),
        file_path: root.join(file_name).into_string(),
        file_size,
        checksum,
    })
}
