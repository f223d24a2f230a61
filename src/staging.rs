//! Temporary Artifact Store
//!
//! Writes uploaded image bytes to a uniquely named file inside the configured
//! temp directory and hands back a `StagedImage` guard. The guard removes the
//! file when it is dropped, so every exit path of a request (success, inference
//! failure, decision failure, panic unwind) cleans up without explicit calls.
//!
//! The client's filename is never used as a path component. Only its extension
//! is kept, lower-cased, and only when it is on the image allow-list.

use crate::error::StagingError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Extensions accepted from the client's filename
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];

/// Stages uploads into a single directory
#[derive(Debug, Clone)]
pub struct TempArtifactStore {
    dir: PathBuf,
}

impl TempArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the staging directory if it does not exist yet
    pub async fn ensure_dir(&self) -> Result<(), StagingError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StagingError::Io {
                operation: "create_dir",
                path: self.dir.clone(),
                source,
            })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a fresh file and return the guard that owns it.
    ///
    /// Empty payloads and disallowed extensions are rejected before anything
    /// touches the filesystem.
    pub async fn stage(
        &self,
        bytes: &[u8],
        original_filename: Option<&str>,
    ) -> Result<StagedImage, StagingError> {
        if bytes.is_empty() {
            return Err(StagingError::BadInput("empty image payload".to_string()));
        }

        let extension = validated_extension(original_filename)?;
        let id = Uuid::new_v4();
        let file_name = match &extension {
            Some(ext) => format!("{}.{}", id.simple(), ext),
            None => id.simple().to_string(),
        };
        let path = self.dir.join(&file_name);

        // create_new refuses to clobber an existing file even on a uuid collision
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| StagingError::Io {
                operation: "create",
                path: path.clone(),
                source,
            })?;

        // From here on the guard owns the file, so a failed write still removes it
        let staged = StagedImage {
            id,
            file_name,
            path,
            len: bytes.len() as u64,
            created_at: Utc::now(),
        };

        let write_result = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(source) = write_result {
            return Err(StagingError::Io {
                operation: "write",
                path: staged.path.clone(),
                source,
            });
        }

        debug!(
            image_id = %staged.id,
            bytes = staged.len,
            "Staged uploaded image"
        );
        Ok(staged)
    }

    /// Release a staged artifact. Equivalent to dropping the guard.
    pub fn release(&self, staged: StagedImage) {
        drop(staged);
    }
}

/// Lower-cased extension from an untrusted filename, checked against the allow-list.
pub fn validated_extension(original_filename: Option<&str>) -> Result<Option<String>, StagingError> {
    let Some(name) = original_filename else {
        return Ok(None);
    };

    // Only the final component matters; separators from either platform are stripped
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or("");
    let ext = match Path::new(base).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => return Ok(None),
    };

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(Some(ext))
    } else {
        Err(StagingError::UnsupportedExtension(ext))
    }
}

/// One uploaded image on disk, owned by exactly one request.
///
/// Dropping the guard deletes the file. Deletion failures are logged and
/// counted, never returned.
#[derive(Debug)]
pub struct StagedImage {
    id: Uuid,
    file_name: String,
    path: PathBuf,
    len: u64,
    created_at: DateTime<Utc>,
}

impl StagedImage {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Generated file name, safe to show to clients
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(image_id = %self.id, "Released staged image"),
            Err(e) => {
                crate::metrics::STAGED_ARTIFACTS_LEAKED.inc();
                warn!(
                    image_id = %self.id,
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove staged image"
                );
            }
        }
    }
}
