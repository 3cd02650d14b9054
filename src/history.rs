//! Bounded request history persisted as a JSON array.
//!
//! Writers are serialized through an async mutex and replace the file
//! atomically, so readers only ever see a complete list.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const MAX_HISTORY_ITEMS: usize = 10;

/// Longest `request_summary` taken from submitted text, in characters.
pub const SUMMARY_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Text,
    Image,
    Parse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub request_type: RequestType,
    pub request_summary: String,
    pub response_summary: String,
}

impl HistoryEntry {
    pub fn new(
        request_type: RequestType,
        request_summary: impl Into<String>,
        response_summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request_type,
            request_summary: request_summary.into(),
            response_summary: response_summary.into(),
        }
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, MAX_HISTORY_ITEMS)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry`, evicting the oldest entries beyond capacity.
    pub async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.list().await;
        entries.push(entry);
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }

        write_json_atomic(&self.path, &entries).await
    }

    /// Entries oldest first. Missing and unreadable files both read as empty;
    /// the latter is logged.
    pub async fn list(&self) -> Vec<HistoryEntry> {
        match self.read().await {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "history file unreadable; treating as empty");
                Vec::new()
            }
        }
    }

    /// Deletes the history file. Clearing an absent store is a no-op.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Persistence(format!(
                "remove {}: {}",
                self.path.display(),
                err
            ))),
        }
    }

    async fn read(&self) -> Result<Option<Vec<HistoryEntry>>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entries = serde_json::from_slice(&bytes)?;
        Ok(Some(entries))
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, &data).await?;
    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(AppError::Persistence(format!(
            "replace {}: {}",
            path.display(),
            err
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> HistoryStore {
        HistoryStore::new(dir.path().join("history.json"))
    }

    #[tokio::test]
    async fn missing_file_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).list().await.is_empty());
    }

    #[tokio::test]
    async fn keeps_only_the_ten_most_recent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for n in 1..=12 {
            store
                .append(HistoryEntry::new(RequestType::Text, format!("request #{n}"), "ok"))
                .await
                .unwrap();
            assert!(store.list().await.len() <= MAX_HISTORY_ITEMS);
        }

        let summaries: Vec<String> = store
            .list()
            .await
            .into_iter()
            .map(|entry| entry.request_summary)
            .collect();
        let expected: Vec<String> = (3..=12).map(|n| format!("request #{n}")).collect();
        assert_eq!(summaries, expected);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .append(HistoryEntry::new(RequestType::Parse, "example.com", "summary"))
            .await
            .unwrap();

        store.clear().await.unwrap();
        assert!(store.list().await.is_empty());
        store.clear().await.unwrap();
        assert!(store.list().await.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty_and_is_replaced_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), b"[{\"id\": \"trunc").unwrap();

        assert!(store.list().await.is_empty());

        store
            .append(HistoryEntry::new(RequestType::Image, "banner.png", "Bright banner"))
            .await
            .unwrap();
        let entries = store.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request_summary, "banner.png");
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HistoryStore::with_capacity(dir.path().join("history.json"), 64));

        let tasks: Vec<_> = (0..20)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append(HistoryEntry::new(RequestType::Text, format!("req {n}"), "ok"))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.list().await.len(), 20);
    }

    #[tokio::test]
    async fn file_format_uses_snake_case_and_rfc3339_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .append(HistoryEntry::new(RequestType::Text, "Acme sells shoes", "Strong brand"))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &value[0];
        assert_eq!(entry["request_type"], "text");
        assert_eq!(entry["response_summary"], "Strong brand");
        let timestamp = entry["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());

        // no temp files left next to the store
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("short", SUMMARY_CHARS), "short");
        assert_eq!(truncate_chars(&"я".repeat(60), SUMMARY_CHARS).chars().count(), 50);
    }
}
