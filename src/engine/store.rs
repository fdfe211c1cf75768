use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{io::AsyncWriteExt, sync::Mutex};

use crate::engine::models::ExecutionRecord;

/// Where finished executions go once the caller has its result.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, record: ExecutionRecord) -> anyhow::Result<()>;

    async fn latest(
        &self,
        workspace_id: &str,
        file_id: &str,
    ) -> anyhow::Result<Option<ExecutionRecord>>;
}

/// Latest record per (workspace, file), optionally mirrored to a JSON-lines file.
#[derive(Clone)]
pub struct ExecutionStore {
    records: Arc<DashMap<(String, String), ExecutionRecord>>,
    persistence_path: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl ExecutionStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            persistence_path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn append_line(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let mut line = serde_json::to_string(record).context("failed to encode record")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for ExecutionStore {
    async fn persist(&self, record: ExecutionRecord) -> anyhow::Result<()> {
        let key = (record.workspace_id.clone(), record.file_id.clone());
        self.records.insert(key, record.clone());
        self.append_line(&record).await
    }

    async fn latest(
        &self,
        workspace_id: &str,
        file_id: &str,
    ) -> anyhow::Result<Option<ExecutionRecord>> {
        let key = (workspace_id.to_string(), file_id.to_string());
        Ok(self.records.get(&key).map(|e| e.value().clone()))
    }
}
