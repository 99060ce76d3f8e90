pub mod json_store;
pub mod memory_store;

pub use json_store::JsonFileStore;
pub use memory_store::MemoryStore;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::types::{CandidateRecord, Token};

/// Every record in a store, keyed by token.
pub type Records = BTreeMap<Token, CandidateRecord>;

/// Trait for candidate record persistence.
///
/// Implementations keep a working copy in memory and flush it to durable
/// storage on every mutation, before the mutating call returns.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Re-read durable storage, replacing the working copy.
    async fn load(&self) -> Result<Records>;

    /// Replace every record and flush.
    async fn save(&self, records: Records) -> Result<()>;

    /// Fetch one record.
    async fn get(&self, token: &str) -> Result<Option<CandidateRecord>>;

    /// Insert or replace one record and flush.
    ///
    /// The working copy keeps the new record even when the flush fails.
    async fn put(&self, token: &str, record: CandidateRecord) -> Result<()>;

    /// Snapshot of every record.
    async fn all(&self) -> Result<Records>;

    async fn len(&self) -> Result<usize> {
        Ok(self.all().await?.len())
    }
}
