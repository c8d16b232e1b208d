//! Persistence boundary for per-minute counts.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use pl_core::{CoreError, MinuteDocument, Timestamp};

use crate::config::StoreConfig;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad document on line {line}: {source}")]
    Decode { line: usize, source: CoreError },
    #[error("cannot encode document {line}: {source}")]
    Encode { line: usize, source: CoreError },
    #[error("query exceeded {0:?}")]
    Timeout(Duration),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to per-minute documents.
pub trait MinuteStore: Send + Sync {
    /// Documents with `start <= ts_minute <= end`, ascending by `ts_minute`.
    fn minutes_between(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<MinuteDocument>, StoreError>;
}

fn select(docs: impl Iterator<Item = MinuteDocument>, start: Timestamp, end: Timestamp) -> Vec<MinuteDocument> {
    let mut selected: Vec<MinuteDocument> = docs
        .filter(|d| d.ts_minute >= start && d.ts_minute <= end)
        .collect();
    selected.sort_by_key(|d| d.ts_minute);
    selected
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<Vec<MinuteDocument>>,
}

impl MemoryStore {
    pub fn new(docs: Vec<MinuteDocument>) -> Self {
        Self { docs: RwLock::new(docs) }
    }
}

impl MinuteStore for MemoryStore {
    fn minutes_between(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<MinuteDocument>, StoreError> {
        Ok(select(self.docs.read().iter().copied(), start, end))
    }
}

/// One JSON document per line in `{connection}/{database}/{collection}.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(cfg: &StoreConfig) -> Self {
        Self { path: cfg.collection_path() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Rewrites the collection with `docs`.
    pub fn write_all(&self, docs: &[MinuteDocument]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = String::new();
        for (idx, doc) in docs.iter().enumerate() {
            let line = doc
                .to_json_line()
                .map_err(|source| StoreError::Encode { line: idx + 1, source })?;
            out.push_str(&line);
            out.push('\n');
        }
        std::fs::write(&self.path, out)?;
        Ok(())
    }
}

impl MinuteStore for JsonLinesStore {
    fn minutes_between(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<MinuteDocument>, StoreError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut docs = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc = MinuteDocument::from_json_line(&line)
                .map_err(|source| StoreError::Decode { line: idx + 1, source })?;
            docs.push(doc);
        }
        debug!(path = %self.path.display(), read = docs.len(), "minute documents loaded");
        Ok(select(docs.into_iter(), start, end))
    }
}

/// Runs the query on the blocking pool, bounded by `timeout`. No retry.
pub async fn query_minutes(
    store: Arc<dyn MinuteStore>,
    start: Timestamp,
    end: Timestamp,
    timeout: Duration,
) -> Result<Vec<MinuteDocument>, StoreError> {
    let task = tokio::task::spawn_blocking(move || store.minutes_between(start, end));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => {
            warn!(error = %join, "minute query task failed");
            Err(StoreError::Unavailable(join.to_string()))
        }
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}
