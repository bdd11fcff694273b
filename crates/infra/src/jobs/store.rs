//! Job Store: task records of the inline lane.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;

use pathforge_core::{TaskId, TaskRecord};

/// Key-value record of task state.
///
/// `put` is an upsert (last write wins); `get` returns a snapshot so a reader
/// never observes a half-written record.
pub trait JobStore: Send + Sync {
    fn put(&self, record: TaskRecord) -> Result<(), JobStoreError>;

    fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Bounds on how long finished work is kept.
///
/// Only terminal records are ever evicted; queued and processing records stay
/// until they finish. The default keeps everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep at most this many records (oldest terminal records go first).
    pub max_entries: Option<usize>,
    /// Drop terminal records this long after their last update.
    pub ttl: Option<Duration>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_entries.is_none() && self.ttl.is_none()
    }
}

/// Process-local job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
    retention: RetentionPolicy,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, record: &TaskRecord) -> bool {
        match self.retention.ttl {
            Some(ttl) if record.is_terminal() => chrono::Duration::from_std(ttl)
                .map(|ttl| record.updated_at + ttl <= Utc::now())
                .unwrap_or(false),
            _ => false,
        }
    }

    fn enforce_retention(&self, records: &mut HashMap<TaskId, TaskRecord>, keep: &TaskId) {
        if self.retention.ttl.is_some() {
            records.retain(|id, record| id == keep || !self.is_expired(record));
        }

        let Some(max) = self.retention.max_entries else {
            return;
        };
        if records.len() <= max {
            return;
        }

        let mut terminal: Vec<(chrono::DateTime<Utc>, TaskId)> = records
            .iter()
            .filter(|(id, record)| *id != keep && record.is_terminal())
            .map(|(id, record)| (record.updated_at, id.clone()))
            .collect();
        terminal.sort();

        let excess = records.len() - max;
        for (_, id) in terminal.into_iter().take(excess) {
            records.remove(&id);
        }
    }
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

impl JobStore for InMemoryJobStore {
    fn put(&self, record: TaskRecord) -> Result<(), JobStoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let id = record.task_id.clone();
        records.insert(id.clone(), record);
        if !self.retention.is_unbounded() {
            self.enforce_retention(&mut records, &id);
        }
        Ok(())
    }

    fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, JobStoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .get(task_id)
            .filter(|record| !self.is_expired(record))
            .cloned())
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn put(&self, record: TaskRecord) -> Result<(), JobStoreError> {
        (**self).put(record)
    }

    fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, JobStoreError> {
        (**self).get(task_id)
    }
}
