//! Document blob storage.
//!
//! The daemon keeps student documents in a flat directory under the
//! workspace. The trait is the full surface the handlers use, so a hosted
//! object store can be dropped in without touching them.

use anyhow::Context;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub trait BlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()>;
    /// URL for an existing blob; `None` when nothing is stored at the key.
    fn public_url(&self, key: &str) -> Option<String>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let root = workspace.join("docs");
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create docs dir {}", root.to_string_lossy()))?;
        Ok(DirBlobStore { root })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl BlobStore for DirBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.blob_path(key);
        let mut f = File::create(&path)
            .with_context(|| format!("failed to create blob {}", path.to_string_lossy()))?;
        f.write_all(bytes)
            .with_context(|| format!("failed to write blob {}", path.to_string_lossy()))?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> Option<String> {
        let path = self.blob_path(key);
        if !path.is_file() {
            return None;
        }
        Some(format!("file://{}", path.to_string_lossy().replace('\\', "/")))
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.blob_path(key);
        if path.is_file() {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove blob {}", path.to_string_lossy()))?;
        }
        Ok(())
    }
}
