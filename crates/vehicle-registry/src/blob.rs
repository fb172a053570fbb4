use anyhow::{Context, Result};
use async_trait::async_trait;
use common::validation::validate_path_components;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Storage for registration artifacts (driver photos, QR images).
///
/// Keys are relative, `/`-separated paths such as `qr_codes/ABC-1234.png`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, returning the path recorded on the vehicle
    async fn save(&self, bytes: &[u8], key: &str) -> Result<String>;

    /// Move a stored object to `to`, replacing any object already there.
    /// Returns the public path of `to`.
    async fn promote(&self, from: &str, to: &str) -> Result<String>;

    /// Remove a stored object; missing objects are not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Path recorded on the vehicle for an object stored under `key`
    fn public_path(&self, key: &str) -> String;
}

/// Filesystem blob store rooted at a directory that is also served over HTTP
#[derive(Clone)]
pub struct FsBlobStore {
    storage_root: PathBuf,
    public_prefix: String,
}

impl FsBlobStore {
    /// `public_prefix` is prepended to keys in returned paths (e.g. `static`)
    pub fn new(storage_root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            storage_root: storage_root.into(),
            public_prefix: public_prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Initialize storage directory
    pub async fn init(&self) -> Result<()> {
        if !self.storage_root.exists() {
            fs::create_dir_all(&self.storage_root)
                .await
                .context("failed to create blob storage directory")?;
            info!("created blob storage directory: {:?}", self.storage_root);
        }
        Ok(())
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Absolute location of a key on disk
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        validate_path_components(Path::new(key), &self.storage_root, "blob key")
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, bytes: &[u8], key: &str) -> Result<String> {
        let file_path = self.resolve(key)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create blob subdirectory")?;
        }

        debug!("storing blob: {} (size: {} bytes)", file_path.display(), bytes.len());

        let mut file = fs::File::create(&file_path)
            .await
            .with_context(|| format!("failed to create {}", file_path.display()))?;
        file.write_all(bytes)
            .await
            .context("failed to write blob data")?;
        file.sync_all().await.context("failed to sync blob file")?;

        Ok(self.public_path(key))
    }

    async fn promote(&self, from: &str, to: &str) -> Result<String> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create blob subdirectory")?;
        }

        fs::rename(&source, &target).await.with_context(|| {
            format!("failed to move {} to {}", source.display(), target.display())
        })?;
        debug!("promoted blob: {:?} -> {:?}", source, target);

        Ok(self.public_path(to))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let file_path = self.resolve(key)?;
        match fs::remove_file(&file_path).await {
            Ok(()) => {
                debug!("deleted blob: {:?}", file_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("blob not found for deletion: {:?}", file_path);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("failed to delete {}", file_path.display())),
        }
    }

    fn public_path(&self, key: &str) -> String {
        if self.public_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.public_prefix, key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path(), "static");
        store.init().await.unwrap();

        let path = store.save(b"png bytes", "qr_codes/ABC-1234.png").await.unwrap();
        assert_eq!(path, "static/qr_codes/ABC-1234.png");

        let on_disk = temp_dir.path().join("qr_codes/ABC-1234.png");
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"png bytes");

        store.delete("qr_codes/ABC-1234.png").await.unwrap();
        assert!(!on_disk.exists());

        // Deleting again is fine
        store.delete("qr_codes/ABC-1234.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_promote_replaces_target() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path(), "static");

        store.save(b"old", "qr_codes/ABC-1234.png").await.unwrap();
        store.save(b"new", "qr_codes/ABC-1234.png.01.part").await.unwrap();

        let path = store
            .promote("qr_codes/ABC-1234.png.01.part", "qr_codes/ABC-1234.png")
            .await
            .unwrap();
        assert_eq!(path, "static/qr_codes/ABC-1234.png");
        assert_eq!(
            std::fs::read(temp_dir.path().join("qr_codes/ABC-1234.png")).unwrap(),
            b"new"
        );
        assert!(!temp_dir.path().join("qr_codes/ABC-1234.png.01.part").exists());

        // Missing source
        assert!(store.promote("qr_codes/gone.part", "qr_codes/x.png").await.is_err());
        assert_eq!(store.public_path(""), "static/");
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(temp_dir.path(), "");

        assert!(store.save(b"x", "../escape.txt").await.is_err());
        assert!(store.save(b"x", "/etc/owned").await.is_err());
        assert_eq!(store.save(b"x", "a/b.txt").await.unwrap(), "a/b.txt");
    }
}
