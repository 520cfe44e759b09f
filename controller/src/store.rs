use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;

use irclimate_common::{storage_key, PersistedState, RuntimeConfig};

/// Persists the last desired state of each climate across restarts.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn load_snapshot(&self, climate: &str) -> anyhow::Result<Option<PersistedState>>;

    async fn save_snapshot(&self, climate: &str, snapshot: &PersistedState) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct FileStore {
    runtime_path: Arc<PathBuf>,
    state_dir: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("IRCLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.irclimate"));
        Self::new(data_dir)
    }

    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            state_dir: Arc::new(data_dir.join("state")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw).with_context(|| {
                format!("invalid runtime config at {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn snapshot_path(&self, climate: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", storage_key(climate)))
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn load_snapshot(&self, climate: &str) -> anyhow::Result<Option<PersistedState>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.snapshot_path(climate)).await {
            Ok(raw) => Ok(Some(PersistedState::from_slice(&raw))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_snapshot(&self, climate: &str, snapshot: &PersistedState) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.snapshot_path(climate);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
