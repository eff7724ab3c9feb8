//! Checkpoint persistence
//!
//! A checkpoint is a durable snapshot of a session's state plus the stage
//! it is paused at, written after every stage transition and read on
//! resume. It is never partially applied: resume either finds a valid
//! paused checkpoint or fails. Within a session there is exactly one
//! writer, so last-writer-wins per key is enough.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::state::{SessionState, Stage};
use crate::Result;

/// A persisted `(session, state, pending stage)` snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_key: String,
    pub state: SessionState,
    /// Which stage is paused awaiting resume, if any
    pub pending_stage: Option<Stage>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(session_key: &str, state: SessionState, pending_stage: Option<Stage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_key: session_key.to_string(),
            state,
            pending_stage,
            created_at: Utc::now(),
        }
    }
}

/// Durable, session-keyed checkpoint storage.
///
/// A completed `save` must be visible to every later `load` for the same
/// key before `save` returns.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    async fn load(&self, session_key: &str) -> Result<Option<Checkpoint>>;

    async fn delete(&self, session_key: &str) -> Result<()>;
}

/// In-memory store for tests and embedders that persist elsewhere
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    inner: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut map = self.inner.write().await;
        map.insert(checkpoint.session_key.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, session_key: &str) -> Result<Option<Checkpoint>> {
        let map = self.inner.read().await;
        Ok(map.get(session_key).cloned())
    }

    async fn delete(&self, session_key: &str) -> Result<()> {
        let mut map = self.inner.write().await;
        map.remove(session_key);
        Ok(())
    }
}

/// File-backed store: one YAML file per session under a directory
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, session_key: &str) -> PathBuf {
        // Session keys are opaque; keep filenames tame
        let safe: String = session_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{}.yaml", safe))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.session_key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_yaml::to_string(checkpoint)?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    async fn load(&self, session_key: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(session_key);
        if !path_exists(&path).await {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let checkpoint: Checkpoint = serde_yaml::from_str(&content)?;
        Ok(Some(checkpoint))
    }

    async fn delete(&self, session_key: &str) -> Result<()> {
        let path = self.path_for(session_key);
        if path_exists(&path).await {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
