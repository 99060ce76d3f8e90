use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::pipeline::types::CandidateRecord;
use crate::storage::{CandidateStore, Records};

/// File-based JSON candidate store.
///
/// All records live in one JSON object keyed by token. Every flush rotates
/// the previous primary file to `<path>.backup` before writing.
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<Records>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty file if none exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }

        let records = read_records(&path).await?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            write_records(&path, &records).await?;
            info!("Created candidate store at {}", path.display());
        } else {
            info!("Loaded {} candidate record(s) from {}", records.len(), path.display());
        }

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CandidateStore for JsonFileStore {
    async fn load(&self) -> Result<Records> {
        let mut records = self.records.write().await;
        *records = read_records(&self.path).await?;
        Ok(records.clone())
    }

    async fn save(&self, new_records: Records) -> Result<()> {
        let mut records = self.records.write().await;
        *records = new_records;
        write_records(&self.path, &records).await
    }

    async fn get(&self, token: &str) -> Result<Option<CandidateRecord>> {
        Ok(self.records.read().await.get(token).cloned())
    }

    async fn put(&self, token: &str, record: CandidateRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(token.to_string(), record);
        write_records(&self.path, &records).await
    }

    async fn all(&self) -> Result<Records> {
        Ok(self.records.read().await.clone())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

/// Sibling path holding the previous version of the store.
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".backup")
}

fn corrupt_path(path: &Path) -> PathBuf {
    with_suffix(path, &format!(".corrupt-{}", timestamp()))
}

/// Side file holding records that could not be decoded.
fn rejected_path(path: &Path) -> PathBuf {
    with_suffix(path, &format!(".rejected-{}", timestamp()))
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Decoded store contents.
#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub records: Records,
    /// Raw entries whose record did not decode, keyed by token.
    pub rejected: Map<String, Value>,
}

/// Decode a store document record by record.
///
/// Only a document that is not a JSON object is an error. A single record
/// that does not decode lands in `rejected` and the rest still load.
pub fn parse_records(data: &str) -> serde_json::Result<ParsedRecords> {
    let entries: Map<String, Value> = serde_json::from_str(data)?;
    let mut parsed = ParsedRecords::default();
    for (token, raw) in entries {
        match serde_json::from_value::<CandidateRecord>(raw.clone()) {
            Ok(record) => {
                parsed.records.insert(token, record);
            }
            Err(e) => {
                warn!(token = %token, "Skipping candidate record that does not decode: {}", e);
                parsed.rejected.insert(token, raw);
            }
        }
    }
    Ok(parsed)
}

/// Read every record from `path`.
///
/// A missing or blank file is an empty store. A file that is not a JSON
/// object is renamed aside and the store starts empty; the backup is left as
/// is. Records that do not decode are copied to a `.rejected-<ts>` side file
/// and left out of the store.
pub async fn read_records(path: &Path) -> Result<Records> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Records::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read store file: {}", path.display()));
        }
    };
    if data.trim().is_empty() {
        return Ok(Records::new());
    }

    let parsed = match parse_records(&data) {
        Ok(parsed) => parsed,
        Err(parse_err) => {
            let aside = corrupt_path(path);
            warn!(
                "Store file {} is corrupt ({}), moving it to {}",
                path.display(),
                parse_err,
                aside.display()
            );
            tokio::fs::rename(path, &aside)
                .await
                .with_context(|| format!("Failed to move corrupt store file: {}", path.display()))?;
            return Ok(Records::new());
        }
    };

    if !parsed.rejected.is_empty() {
        let aside = rejected_path(path);
        let body = serde_json::to_string_pretty(&parsed.rejected).context("Failed to serialize rejected records")?;
        tokio::fs::write(&aside, body)
            .await
            .with_context(|| format!("Failed to write rejected records to {}", aside.display()))?;
        warn!(
            count = parsed.rejected.len(),
            "Set aside undecodable candidate record(s) in {}",
            aside.display()
        );
    }
    Ok(parsed.records)
}

/// Write every record to `path`, rotating the current file to the backup.
///
/// Not atomic: a crash between rotation and write leaves only the backup.
/// When the write itself fails, the backup is copied back over the primary.
pub async fn write_records(path: &Path, records: &Records) -> Result<()> {
    let data = serde_json::to_string_pretty(records).context("Failed to serialize candidate records")?;
    rotate_and_write(path, &data, write_file).await
}

async fn rotate_and_write(
    path: &Path,
    data: &str,
    write: impl AsyncFnOnce(&Path, &str) -> Result<()>,
) -> Result<()> {
    let backup = backup_path(path);

    let rotated = if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if tokio::fs::try_exists(&backup).await.unwrap_or(false) {
            tokio::fs::remove_file(&backup)
                .await
                .with_context(|| format!("Failed to remove old backup: {}", backup.display()))?;
        }
        tokio::fs::rename(path, &backup)
            .await
            .with_context(|| format!("Failed to rotate store file to {}", backup.display()))?;
        true
    } else {
        false
    };

    if let Err(write_err) = write(path, data).await {
        error!("Failed to write store file {}: {:#}", path.display(), write_err);
        if rotated {
            match tokio::fs::copy(&backup, path).await {
                Ok(_) => warn!("Restored {} from backup", path.display()),
                Err(e) => error!("Failed to restore {} from backup: {}", path.display(), e),
            }
        }
        return Err(write_err);
    }
    Ok(())
}

async fn write_file(path: &Path, data: &str) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create store file: {}", path.display()))?;
    file.write_all(data.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}
