//! Per-device rolling history on flat files: one JSON artifact per device,
//! rewritten on every append with entries outside the retention window
//! dropped. Deliberately not a database; write amplification is the price of
//! a trivially readable on-disk format at low poll rates.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use common::GridResult;
use tracing::warn;
use types::{DeviceId, Reading};

#[derive(Debug, Clone)]
pub struct HistoryStore {
    data_dir: PathBuf,
    retention: Duration,
}

impl HistoryStore {
    pub fn new(data_dir: impl Into<PathBuf>, retention_hours: u64) -> Self {
        HistoryStore {
            data_dir: data_dir.into(),
            retention: Duration::hours(retention_hours as i64),
        }
    }

    fn file_path(&self, device_id: &DeviceId) -> PathBuf {
        self.data_dir.join(format!("device_{device_id}.json"))
    }

    /// Appends a reading and trims everything older than the retention
    /// window, then persists the whole log as the new file contents.
    pub async fn append(&self, reading: &Reading) -> GridResult<()> {
        let mut log = self.load(&reading.device_id).await?;
        log.push(reading.clone());

        let cutoff = Utc::now() - self.retention;
        log.retain(|entry| entry.timestamp > cutoff);

        let raw = serde_json::to_vec_pretty(&log)?;
        tokio::fs::write(self.file_path(&reading.device_id), raw).await?;
        Ok(())
    }

    /// Returns the retained log for a device; an absent file is an empty
    /// log, and an unreadable log is discarded rather than wedging polling.
    pub async fn load(&self, device_id: &DeviceId) -> GridResult<Vec<Reading>> {
        let path = self.file_path(device_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&raw) {
            Ok(log) => Ok(log),
            Err(e) => {
                warn!("discarding unreadable history file {path:?}: {e}");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use types::RegisterValue;

    use super::*;

    fn reading_at(device_id: i64, age_hours: i64) -> Reading {
        let mut values = BTreeMap::new();
        values.insert(
            "voltage".to_owned(),
            RegisterValue::ok("230.000".to_owned(), "V".to_owned(), vec![0, 2300]),
        );
        Reading::with_values(
            DeviceId::Int(device_id),
            Utc::now() - Duration::hours(age_hours),
            values,
        )
    }

    #[tokio::test]
    async fn test_append_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 24);

        store.append(&reading_at(1, 0)).await.unwrap();
        store.append(&reading_at(1, 0)).await.unwrap();

        let log = store.load(&DeviceId::Int(1)).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].values.as_ref().unwrap()["voltage"].value.as_deref(), Some("230.000"));
    }

    #[tokio::test]
    async fn test_retention_trims_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 24);

        store.append(&reading_at(1, 30)).await.unwrap();
        store.append(&reading_at(1, 2)).await.unwrap();
        store.append(&reading_at(1, 0)).await.unwrap();

        let log = store.load(&DeviceId::Int(1)).await.unwrap();
        assert_eq!(log.len(), 2);
        let cutoff = Utc::now() - Duration::hours(24);
        assert!(log.iter().all(|entry| entry.timestamp > cutoff));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 24);
        let log = store.load(&DeviceId::Int(42)).await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_recovers_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 24);
        tokio::fs::write(dir.path().join("device_7.json"), b"{ garbage")
            .await
            .unwrap();

        let log = store.load(&DeviceId::Int(7)).await.unwrap();
        assert!(log.is_empty());

        // An append over the corrupt file starts a fresh log.
        store.append(&reading_at(7, 0)).await.unwrap();
        assert_eq!(store.load(&DeviceId::Int(7)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_one_file_per_device() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 24);

        store.append(&reading_at(1, 0)).await.unwrap();
        store.append(&reading_at(2, 0)).await.unwrap();

        assert!(dir.path().join("device_1.json").exists());
        assert!(dir.path().join("device_2.json").exists());
        assert_eq!(store.load(&DeviceId::Int(1)).await.unwrap().len(), 1);
    }
}
