//! Workspace document storage.
//!
//! One document per workspace: the ordered service list exactly as the editor sent it. Writes are
//! full replaces (last write wins).

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDocument {
    pub workspace_id: String,
    /// Opaque hash used to address the workspace from MCP endpoint URLs.
    pub wid_hash: String,
    pub services: Value,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceDocument {
    #[must_use]
    pub fn new(workspace_id: &str, wid_hash: Option<String>, services: Value) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            wid_hash: wid_hash
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| workspace_hash(workspace_id)),
            services,
            updated_at: Utc::now(),
        }
    }
}

/// Hex SHA-256 of a workspace id.
#[must_use]
pub fn workspace_hash(workspace_id: &str) -> String {
    hex::encode(Sha256::digest(workspace_id.as_bytes()))
}

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn get(&self, workspace_id: &str) -> anyhow::Result<Option<WorkspaceDocument>>;

    async fn get_by_hash(&self, wid_hash: &str) -> anyhow::Result<Option<WorkspaceDocument>>;

    /// Replace a workspace's document.
    async fn put(&self, document: WorkspaceDocument) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, WorkspaceDocument>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkspaceStore for MemoryStore {
    async fn get(&self, workspace_id: &str) -> anyhow::Result<Option<WorkspaceDocument>> {
        Ok(self.docs.read().get(workspace_id).cloned())
    }

    async fn get_by_hash(&self, wid_hash: &str) -> anyhow::Result<Option<WorkspaceDocument>> {
        Ok(self
            .docs
            .read()
            .values()
            .find(|d| d.wid_hash == wid_hash)
            .cloned())
    }

    async fn put(&self, document: WorkspaceDocument) -> anyhow::Result<()> {
        self.docs
            .write()
            .insert(document.workspace_id.clone(), document);
        Ok(())
    }
}

/// One JSON file per workspace under a data directory.
///
/// Files are named by the hash of the workspace id. A `widHash -> path` index, built when the
/// directory is opened and maintained by `put`, serves MCP endpoint lookups without scanning.
pub struct DirStore {
    dir: PathBuf,
    index: RwLock<HashMap<String, PathBuf>>,
    // Held across the file replace and the index update.
    write_lock: tokio::sync::Mutex<()>,
    tmp_seq: AtomicU64,
}

impl DirStore {
    /// Open (and create if needed) a data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or listed.
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create data dir {}", dir.display()))?;
        let index = Self::build_index(&dir).await?;
        debug!(data_dir = %dir.display(), workspaces = index.len(), "indexed workspace documents");
        Ok(Self {
            dir,
            index: RwLock::new(index),
            write_lock: tokio::sync::Mutex::new(()),
            tmp_seq: AtomicU64::new(0),
        })
    }

    async fn build_index(dir: &Path) -> anyhow::Result<HashMap<String, PathBuf>> {
        let mut index = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("list {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(doc) = Self::read_file(&path).await? {
                index.insert(doc.wid_hash, path);
            }
        }
        Ok(index)
    }

    fn path_for(&self, workspace_id: &str) -> PathBuf {
        // Workspace ids are caller-chosen; never use them as file names directly.
        self.dir
            .join(format!("{}.json", workspace_hash(workspace_id)))
    }

    fn tmp_path_for(&self, path: &Path) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}-{seq}.tmp", std::process::id()));
        path.with_file_name(name)
    }

    async fn read_file(path: &Path) -> anyhow::Result<Option<WorkspaceDocument>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        match serde_json::from_slice(&bytes) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable workspace document; ignoring");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl WorkspaceStore for DirStore {
    async fn get(&self, workspace_id: &str) -> anyhow::Result<Option<WorkspaceDocument>> {
        Self::read_file(&self.path_for(workspace_id)).await
    }

    async fn get_by_hash(&self, wid_hash: &str) -> anyhow::Result<Option<WorkspaceDocument>> {
        let Some(path) = self.index.read().get(wid_hash).cloned() else {
            return Ok(None);
        };
        Ok(Self::read_file(&path)
            .await?
            .filter(|doc| doc.wid_hash == wid_hash))
    }

    async fn put(&self, document: WorkspaceDocument) -> anyhow::Result<()> {
        let path = self.path_for(&document.workspace_id);
        let bytes = serde_json::to_vec_pretty(&document).context("serialize workspace document")?;

        let _guard = self.write_lock.lock().await;
        let tmp = self.tmp_path_for(&path);
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("write {}", tmp.display()));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e)
                .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()));
        }

        let mut index = self.index.write();
        index.retain(|_, p| *p != path);
        index.insert(document.wid_hash, path);
        Ok(())
    }
}
