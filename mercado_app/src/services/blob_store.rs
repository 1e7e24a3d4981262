// mercado_app/src/services/blob_store.rs

use crate::errors::{AppError, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// Image formats accepted as proof of delivery, with their file extension.
const ACCEPTED_MEDIA: &[(&str, &str)] = &[("image/jpeg", "jpg"), ("image/png", "png"), ("image/webp", "webp")];

fn extension_for(content_type: &str) -> Option<&'static str> {
  let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
  ACCEPTED_MEDIA
    .iter()
    .find(|(mime, _)| *mime == essence)
    .map(|(_, ext)| *ext)
}

/// Flat directory of proof photos. A stored photo is referred to by
/// `<uuid>.<ext>`, which is what ends up in `orders.proof_image`.
#[derive(Debug, Clone)]
pub struct BlobStore {
  base_path: PathBuf,
  max_size: usize,
}

impl BlobStore {
  pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self> {
    fs::create_dir_all(&base_path).await.map_err(|e| {
      AppError::Blob(format!(
        "Failed to create blob directory '{}': {}",
        base_path.display(),
        e
      ))
    })?;

    info!(path = %base_path.display(), max_size, "Blob store initialized");

    Ok(Self { base_path, max_size })
  }

  pub fn max_size(&self) -> usize {
    self.max_size
  }

  /// Stores an image and returns its reference.
  pub async fn store_image(&self, data: &[u8], content_type: &str) -> Result<String> {
    if data.is_empty() {
      return Err(AppError::MissingProof);
    }
    if data.len() > self.max_size {
      return Err(AppError::BlobTooLarge {
        size: data.len(),
        max: self.max_size,
      });
    }
    let ext = extension_for(content_type).ok_or_else(|| AppError::UnsupportedMedia(content_type.to_string()))?;

    let reference = format!("{}.{}", Uuid::new_v4(), ext);
    let path = self.base_path.join(&reference);
    fs::write(&path, data)
      .await
      .map_err(|e| AppError::Blob(format!("Failed to write blob {}: {}", reference, e)))?;

    debug!(reference = %reference, size = data.len(), "Stored blob");
    Ok(reference)
  }

  pub async fn read_image(&self, reference: &str) -> Result<Vec<u8>> {
    let path = self.base_path.join(Self::validate_reference(reference)?);
    if !path.exists() {
      return Err(AppError::NotFound(format!("Blob {} not found", reference)));
    }
    let data = fs::read(&path)
      .await
      .map_err(|e| AppError::Blob(format!("Failed to read blob {}: {}", reference, e)))?;
    debug!(reference = %reference, size = data.len(), "Retrieved blob");
    Ok(data)
  }

  /// Only `<uuid>.<known ext>` is a valid reference, which rules out traversal.
  fn validate_reference(reference: &str) -> Result<&str> {
    let (stem, ext) = reference
      .split_once('.')
      .ok_or_else(|| AppError::Validation("Malformed blob reference".to_string()))?;
    let known_ext = ACCEPTED_MEDIA.iter().any(|(_, e)| *e == ext);
    if Uuid::parse_str(stem).is_err() || !known_ext {
      return Err(AppError::Validation("Malformed blob reference".to_string()));
    }
    Ok(reference)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  async fn store(max: usize) -> (BlobStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = BlobStore::new(dir.path().to_path_buf(), max).await.unwrap();
    (store, dir)
  }

  #[tokio::test]
  async fn stores_and_reads_back() {
    let (store, _dir) = store(1024).await;
    let reference = store.store_image(b"\xFF\xD8\xFFphoto", "image/jpeg").await.unwrap();
    assert!(reference.ends_with(".jpg"));
    assert_eq!(store.read_image(&reference).await.unwrap(), b"\xFF\xD8\xFFphoto");
  }

  #[tokio::test]
  async fn rejects_empty_oversized_and_foreign_media() {
    let (store, _dir) = store(4).await;
    assert!(matches!(store.store_image(b"", "image/png").await, Err(AppError::MissingProof)));
    assert!(matches!(
      store.store_image(b"12345", "image/png").await,
      Err(AppError::BlobTooLarge { size: 5, max: 4 })
    ));
    assert!(matches!(
      store.store_image(b"1", "application/pdf").await,
      Err(AppError::UnsupportedMedia(_))
    ));
  }

  #[tokio::test]
  async fn refuses_traversal_references() {
    let (store, _dir) = store(16).await;
    assert!(matches!(store.read_image("../etc/passwd").await, Err(AppError::Validation(_))));
    assert!(matches!(store.read_image("abc.jpg").await, Err(AppError::Validation(_))));
  }

  #[test]
  fn content_type_parameters_are_ignored() {
    assert_eq!(extension_for("IMAGE/PNG; charset=binary"), Some("png"));
    assert_eq!(extension_for("image/gif"), None);
  }
}
