use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::types::CandidateRecord;
use crate::storage::{CandidateStore, Records};

/// In-memory candidate store. Holds records only for the lifetime of the
/// instance; selected by `--store :memory:` and used throughout the tests.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Records) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn load(&self) -> Result<Records> {
        Ok(self.records().clone())
    }

    async fn save(&self, records: Records) -> Result<()> {
        *self.records() = records;
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<CandidateRecord>> {
        Ok(self.records().get(token).cloned())
    }

    async fn put(&self, token: &str, record: CandidateRecord) -> Result<()> {
        self.records().insert(token.to_string(), record);
        Ok(())
    }

    async fn all(&self) -> Result<Records> {
        Ok(self.records().clone())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records().len())
    }
}
