//! # Receipt Storage Gateway
//!
//! Persists uploaded receipt files under a per-user namespace on the local
//! filesystem and resolves client-supplied receipt paths back to owned files.
//!
//! Uploads are checked against an [`UploadPolicy`] before anything touches the
//! disk. Accepted files are written to `<root>/<owner_id>/receipt_<32 hex>.<ext>`
//! with create-new semantics, so an existing file is never overwritten.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::errors::{error_logging, InputViolation, ReceiptError, ReceiptResult};
use crate::path_validation;

/// Which content types an upload endpoint accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPolicy {
    /// Receipt photos for the extraction pipeline
    ReceiptImage,
    /// General document uploads, which also allow PDF
    Document,
}

impl UploadPolicy {
    /// File extension for an accepted content type, `None` if rejected
    pub fn extension_for(&self, content_type: &str) -> Option<&'static str> {
        match (self, essence(content_type).as_str()) {
            (_, "image/jpeg") => Some("jpg"),
            (_, "image/png") => Some("png"),
            (UploadPolicy::Document, "application/pdf") => Some("pdf"),
            _ => None,
        }
    }
}

/// Lower-cased media type without parameters
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// A stored receipt file
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptArtifact {
    /// Path relative to the storage root, `/`-separated
    pub path: String,
    pub owner_id: Uuid,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Local filesystem receipt storage
#[derive(Debug, Clone)]
pub struct ReceiptStorage {
    root: PathBuf,
    max_upload_bytes: u64,
}

impl ReceiptStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Check an upload against the policy and size limit without side effects.
    ///
    /// Returns the file extension to store the upload under.
    pub fn check_upload(
        &self,
        policy: UploadPolicy,
        content_type: &str,
        size_bytes: u64,
    ) -> Result<&'static str, InputViolation> {
        let extension = policy
            .extension_for(content_type)
            .ok_or_else(|| InputViolation::UnsupportedMediaType(content_type.to_string()))?;
        if size_bytes == 0 {
            return Err(InputViolation::EmptyPayload);
        }
        if size_bytes > self.max_upload_bytes {
            return Err(InputViolation::PayloadTooLarge {
                limit: self.max_upload_bytes,
            });
        }
        Ok(extension)
    }

    /// Validate and write an upload into the owner's namespace
    pub async fn store(
        &self,
        owner_id: Uuid,
        policy: UploadPolicy,
        content_type: &str,
        bytes: &[u8],
    ) -> ReceiptResult<ReceiptArtifact> {
        let size_bytes = bytes.len() as u64;
        let extension = self.check_upload(policy, content_type, size_bytes)?;

        let owner_dir = self.root.join(owner_id.to_string());
        tokio::fs::create_dir_all(&owner_dir).await.map_err(|e| {
            error_logging::log_filesystem_error(
                &e,
                "create_owner_dir",
                owner_dir.to_str(),
                None,
            );
            ReceiptError::from(e)
        })?;

        let file_name = format!("receipt_{:032x}.{}", rand::random::<u128>(), extension);
        let full_path = owner_dir.join(&file_name);

        if let Err(e) = write_new_file(&full_path, bytes).await {
            error_logging::log_filesystem_error(
                &e,
                "write_receipt",
                full_path.to_str(),
                Some(size_bytes),
            );
            // A partially written file must not be left behind
            let _ = tokio::fs::remove_file(&full_path).await;
            return Err(e.into());
        }

        let relative = format!("{}/{}", owner_id, file_name);
        info!(
            owner_id = %owner_id,
            receipt_path = %relative,
            size_bytes = size_bytes,
            "Stored receipt upload"
        );

        Ok(ReceiptArtifact {
            path: relative,
            owner_id,
            content_type: essence(content_type),
            size_bytes,
        })
    }

    /// Resolve a client-supplied receipt path to a file the owner may use
    pub async fn resolve_owned(&self, owner_id: Uuid, path: &str) -> ReceiptResult<PathBuf> {
        let resolved = path_validation::resolve_owned_receipt(&self.root, &owner_id, path)
            .await
            .map_err(|e| {
                debug!(owner_id = %owner_id, path = %path, error = %e, "Receipt path rejected");
                ReceiptError::from(e)
            })?;
        Ok(resolved)
    }

    /// Whether `path` names an existing file in the owner's namespace
    pub async fn exists(&self, owner_id: Uuid, path: &str) -> bool {
        path_validation::resolve_owned_receipt(&self.root, &owner_id, path)
            .await
            .is_ok()
    }
}

async fn write_new_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PathViolation;

    fn storage_in(root: &Path, limit: u64) -> ReceiptStorage {
        ReceiptStorage::new(&StorageConfig {
            root: root.to_path_buf(),
            max_upload_bytes: limit,
        })
    }

    #[test]
    fn test_policy_extensions() {
        assert_eq!(UploadPolicy::ReceiptImage.extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(UploadPolicy::ReceiptImage.extension_for("IMAGE/PNG"), Some("png"));
        assert_eq!(
            UploadPolicy::ReceiptImage.extension_for("image/png; charset=binary"),
            Some("png")
        );
        assert_eq!(UploadPolicy::ReceiptImage.extension_for("application/pdf"), None);
        assert_eq!(UploadPolicy::Document.extension_for("application/pdf"), Some("pdf"));
        assert_eq!(UploadPolicy::Document.extension_for("image/gif"), None);
    }

    #[tokio::test]
    async fn test_store_writes_into_owner_namespace() {
        let root = tempfile::tempdir().expect("temp dir");
        let storage = storage_in(root.path(), 1024);
        let owner = Uuid::new_v4();

        let artifact = storage
            .store(owner, UploadPolicy::ReceiptImage, "image/png", b"png-bytes")
            .await
            .expect("upload stored");

        assert!(artifact.path.starts_with(&format!("{}/receipt_", owner)));
        assert!(artifact.path.ends_with(".png"));
        let file_name = artifact.path.rsplit('/').next().expect("file name");
        assert_eq!(file_name.len(), "receipt_".len() + 32 + ".png".len());
        assert_eq!(artifact.size_bytes, 9);

        let on_disk = std::fs::read(root.path().join(&artifact.path)).expect("file exists");
        assert_eq!(on_disk, b"png-bytes");

        let resolved = storage
            .resolve_owned(owner, &artifact.path)
            .await
            .expect("owner can resolve");
        assert!(resolved.is_file());
        assert!(storage.exists(owner, &artifact.path).await);
        assert!(!storage.exists(owner, &format!("{}/receipt_gone.png", owner)).await);
        assert!(!storage.exists(Uuid::new_v4(), &artifact.path).await);
    }

    #[tokio::test]
    async fn test_rejections_leave_no_files() {
        let root = tempfile::tempdir().expect("temp dir");
        let storage = storage_in(root.path(), 8);
        let owner = Uuid::new_v4();

        let too_big = storage
            .store(owner, UploadPolicy::ReceiptImage, "image/jpeg", &[0u8; 9])
            .await;
        assert_eq!(
            too_big,
            Err(ReceiptError::InputValidation(InputViolation::PayloadTooLarge { limit: 8 }))
        );

        let empty = storage
            .store(owner, UploadPolicy::ReceiptImage, "image/jpeg", &[])
            .await;
        assert_eq!(empty, Err(ReceiptError::InputValidation(InputViolation::EmptyPayload)));

        let gif = storage
            .store(owner, UploadPolicy::ReceiptImage, "image/gif", b"GIF8")
            .await;
        assert!(matches!(
            gif,
            Err(ReceiptError::InputValidation(InputViolation::UnsupportedMediaType(_)))
        ));

        assert_eq!(std::fs::read_dir(root.path()).expect("root readable").count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_rejects_other_owner() {
        let root = tempfile::tempdir().expect("temp dir");
        let storage = storage_in(root.path(), 1024);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let artifact = storage
            .store(alice, UploadPolicy::ReceiptImage, "image/jpeg", b"jpeg")
            .await
            .expect("upload stored");

        assert_eq!(
            storage.resolve_owned(bob, &artifact.path).await,
            Err(ReceiptError::PathViolation(PathViolation::ForeignNamespace))
        );
    }
}
