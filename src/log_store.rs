use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::LogStoreError;
use crate::validation::SendEmailRequest;

/// An accepted send as it appears in the log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(with = "humantime_serde")]
    pub time: SystemTime,
}

impl LogRecord {
    pub fn accepted(request: SendEmailRequest, time: SystemTime) -> Self {
        Self {
            from: request.from,
            to: request.to,
            subject: request.subject,
            body: request.body,
            time,
        }
    }
}

/// JSON array of [`LogRecord`]s kept in a single file.
///
/// Each append reads the whole file, pushes the record and rewrites it.
/// Appends are serialized through an async mutex; the rewrite goes to a
/// sibling temp file first and is renamed into place.
#[derive(Debug)]
pub struct EmailLogStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EmailLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty log. A file that exists but does not hold
    /// a record list is an error.
    pub async fn load(&self) -> Result<Vec<LogRecord>, LogStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn append(&self, record: LogRecord) -> Result<(), LogStoreError> {
        self.append_with(move || record, || ()).await
    }

    /// Append the record produced by `build`, then run `on_persisted`, all
    /// while holding the append lock. Records built here are stamped in file
    /// order. `on_persisted` is not called if the write fails.
    pub async fn append_with<T>(
        &self,
        build: impl FnOnce() -> LogRecord,
        on_persisted: impl FnOnce() -> T,
    ) -> Result<T, LogStoreError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load().await?;
        records.push(build());
        self.rewrite(&records).await?;

        debug!(path = %self.path.display(), records = records.len(), "Email log rewritten");
        Ok(on_persisted())
    }

    async fn rewrite(&self, records: &[LogRecord]) -> Result<(), LogStoreError> {
        let contents = serde_json::to_vec_pretty(records)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_log() -> PathBuf {
        std::env::temp_dir().join(format!("mock-ses-log-{}.json", uuid::Uuid::new_v4()))
    }

    fn record(subject: &str) -> LogRecord {
        LogRecord {
            from: "sender@example.com".to_string(),
            to: vec!["a@example.com".to_string(), "b@example.org".to_string()],
            subject: subject.to_string(),
            body: "body text".to_string(),
            time: SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_log() {
        let store = EmailLogStore::new(temp_log());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_preserves_order_and_fields() {
        let path = temp_log();
        let store = EmailLogStore::new(&path);

        store.append(record("first")).await.unwrap();
        store.append(record("second")).await.unwrap();

        let reloaded = EmailLogStore::new(&path).load().await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0].subject, "first");
        assert_eq!(reloaded.last(), Some(&record("second")));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_time_is_rfc3339_text() {
        let path = temp_log();
        let store = EmailLogStore::new(&path);
        store.append(record("stamp")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let time = raw[0]["time"].as_str().unwrap();
        assert!(time.starts_with("2023-11-14T22:13:20"));
        assert!(time.ends_with('Z'));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_append() {
        let path = temp_log();
        std::fs::write(&path, "{ not a list").unwrap();
        let store = EmailLogStore::new(&path);

        let result = store
            .append_with(|| record("lost"), || panic!("must not run"))
            .await;
        assert!(matches!(result, Err(LogStoreError::Corrupt(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not a list");

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_every_record() {
        let path = temp_log();
        let store = std::sync::Arc::new(EmailLogStore::new(&path));

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.append(record(&format!("msg-{i}"))).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.load().await.unwrap().len(), 10);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_records_built_under_lock_are_time_ordered() {
        let path = temp_log();
        let store = std::sync::Arc::new(EmailLogStore::new(&path));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append_with(
                            move || LogRecord {
                                time: SystemTime::now(),
                                ..record(&format!("msg-{i}"))
                            },
                            || (),
                        )
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let times: Vec<_> = store.load().await.unwrap().into_iter().map(|r| r.time).collect();
        assert_eq!(times.len(), 16);
        assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));

        let _ = std::fs::remove_file(path);
    }
}
