//! # rf-storage-local
//!
//! Local filesystem implementation of `ImageStore`.
//! Features: content-type policy enforcement, content-addressable storage
//! and directory sharding. Identical uploads deduplicate to one file.

use std::path::PathBuf;

use async_trait::async_trait;
use image::ImageFormat;
use rf_core::error::{AppError, Result};
use rf_core::traits::ImageStore;
use sha2::{Digest, Sha256};
use tokio::fs;

/// Uploads above this size are rejected before touching the disk.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub struct LocalImageStore {
    /// Root directory for all uploads (e.g., "./data/post_images")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/post_images")
    url_prefix: String,
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn extension_of(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        _ => None,
    }
}

impl LocalImageStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Generates a sharded relative path: "ab/cd/abcdef...hash.ext"
    fn sharded_name(hash: &str, ext: &str) -> String {
        format!("{}/{}/{hash}.{ext}", &hash[0..2], &hash[2..4])
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    /// Saves an upload under its SHA-256 hash after checking the content
    /// policy: whitelisted type, size cap, and magic bytes that actually
    /// match the declared type.
    async fn store(&self, data: Vec<u8>, content_type: &str) -> Result<String> {
        let ext = extension_for(content_type).ok_or_else(|| {
            AppError::InvalidArgument(format!("unsupported content type: {content_type}"))
        })?;
        if data.len() > MAX_IMAGE_BYTES {
            return Err(AppError::InvalidArgument(format!(
                "image exceeds {MAX_IMAGE_BYTES} bytes"
            )));
        }
        let sniffed = image::guess_format(&data)
            .ok()
            .and_then(extension_of);
        if sniffed != Some(ext) {
            return Err(AppError::InvalidArgument(
                "file contents do not match the declared content type".to_string(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let hash = format!("{:x}", hasher.finalize());
        let rel = Self::sharded_name(&hash, ext);

        let target = self.root_path.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }
        if !target.exists() {
            fs::write(&target, &data)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        Ok(format!("{}/{rel}", self.url_prefix))
    }

    /// Maps the URL back into the sharded tree and removes the file.
    /// Idempotent: a missing file is not an error.
    async fn delete(&self, url: &str) -> Result<()> {
        let rel = url
            .strip_prefix(&self.url_prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("url {url} is not served by this store"))
            })?;
        if rel.is_empty() || rel.split('/').any(|part| part == "..") {
            return Err(AppError::InvalidArgument(format!("refusing to delete {url}")));
        }

        match fs::remove_file(self.root_path.join(rel)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    // Magic bytes are all guess_format needs.
    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn store() -> LocalImageStore {
        let root = std::env::temp_dir().join(format!("rf-store-{}", Uuid::now_v7()));
        LocalImageStore::new(root, "/static/post_images".to_string())
    }

    #[tokio::test]
    async fn stores_under_sharded_hash_and_deletes_idempotently() {
        let store = store();
        let url = store.store(PNG_HEADER.to_vec(), "image/png").await.unwrap();
        assert!(url.starts_with("/static/post_images/"));
        assert!(url.ends_with(".png"));

        // Identical bytes land on the identical URL.
        let again = store.store(PNG_HEADER.to_vec(), "image/png").await.unwrap();
        assert_eq!(url, again);

        store.delete(&url).await.unwrap();
        // Second delete is a no-op, not an error.
        store.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_unsupported_content_type() {
        let store = store();
        let err = store
            .store(PNG_HEADER.to_vec(), "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn rejects_mismatched_magic_bytes() {
        let store = store();
        let err = store
            .store(b"GIF89a trailing".to_vec(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn rejects_foreign_urls() {
        let store = store();
        assert!(store.delete("/elsewhere/a.png").await.is_err());
        assert!(store
            .delete("/static/post_images/../../etc/passwd")
            .await
            .is_err());
    }
}
