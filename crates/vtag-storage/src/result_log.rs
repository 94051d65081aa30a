//! Result log persistence.
//!
//! Two formats sit behind [`ResultSink`]:
//! - [`JsonResultLog`]: a single JSON object `{"analyses": [...]}` rewritten
//!   wholesale on every append (read-modify-write). Prior entries are kept
//!   verbatim; only a log that is not valid JSON or lacks an `analyses` array
//!   is replaced by an empty one instead of failing the save.
//! - [`JsonLinesResultLog`]: one record per line, appended in place.
//!
//! Both serialize writers per absolute log path within the process. Separate
//! processes writing the same path are not coordinated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use vtag_models::{AnalysisRecord, ResultLog};

use crate::error::{StorageError, StorageResult};

/// Durable destination for analysis records.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Append one record, preserving the order of earlier records.
    async fn append(&self, record: &AnalysisRecord) -> StorageResult<()>;

    /// Load every stored record in insertion order.
    async fn load(&self) -> StorageResult<ResultLog>;

    /// Location of the log.
    fn path(&self) -> &Path;
}

/// Persistence format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    /// Whole-file JSON snapshot
    #[default]
    Snapshot,
    /// Append-only JSON lines
    JsonLines,
}

impl LogMode {
    /// Build the sink for this mode at `path`.
    pub fn open(self, path: impl Into<PathBuf>) -> Arc<dyn ResultSink> {
        match self {
            Self::Snapshot => Arc::new(JsonResultLog::new(path)),
            Self::JsonLines => Arc::new(JsonLinesResultLog::new(path)),
        }
    }
}

impl FromStr for LogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" | "json" => Ok(Self::Snapshot),
            "jsonl" | "json-lines" | "jsonlines" => Ok(Self::JsonLines),
            other => Err(format!("unknown log mode '{}'", other)),
        }
    }
}

/// Process-wide lock for one log path.
fn path_lock(path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    static LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
        LazyLock::new(Default::default);

    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

async fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::persistence(format!("create {}: {}", parent.display(), e))
            })?;
        }
    }
    Ok(())
}

const ANALYSES_KEY: &str = "analyses";

/// Sibling temp file for an atomic replace of `path`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Snapshot log as stored on disk. Entries stay raw JSON so that records
/// written by other tools survive a rewrite untouched.
#[derive(Debug, Default)]
struct RawLog {
    fields: Map<String, Value>,
    analyses: Vec<Value>,
}

impl RawLog {
    fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert(ANALYSES_KEY.to_string(), Value::Array(self.analyses));
        Value::Object(fields)
    }
}

/// Snapshot-style JSON result log.
#[derive(Debug, Clone)]
pub struct JsonResultLog {
    path: PathBuf,
}

impl JsonResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the current log. Only a missing file, invalid JSON or a missing
    /// `analyses` array starts a fresh log.
    async fn read_or_init(&self) -> StorageResult<RawLog> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No prior result log, starting empty");
                return Ok(RawLog::default());
            }
            Err(e) => {
                return Err(StorageError::persistence(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(mut fields)) => match fields.remove(ANALYSES_KEY) {
                Some(Value::Array(analyses)) => return Ok(RawLog { fields, analyses }),
                _ => warn!(
                    path = %self.path.display(),
                    "Result log has no analyses array, reinitializing"
                ),
            },
            Ok(_) => warn!(
                path = %self.path.display(),
                "Result log is not a JSON object, reinitializing"
            ),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Result log is not valid JSON, reinitializing"
            ),
        }
        Ok(RawLog::default())
    }

    /// Write via a sibling temp file, then rename over the log.
    async fn write_atomic(&self, log: RawLog) -> StorageResult<()> {
        ensure_parent(&self.path).await?;

        let body = serde_json::to_vec_pretty(&log.into_value())?;
        let tmp = temp_path(&self.path);

        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| StorageError::persistence(format!("write {}: {}", tmp.display(), e)))?;

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::persistence(format!(
                "replace {}: {}",
                self.path.display(),
                e
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ResultSink for JsonResultLog {
    async fn append(&self, record: &AnalysisRecord) -> StorageResult<()> {
        let entry = serde_json::to_value(record)?;

        let lock = path_lock(&self.path);
        let _guard = lock.lock().await;

        let mut log = self.read_or_init().await?;
        log.analyses.push(entry);
        let total = log.analyses.len();
        self.write_atomic(log).await?;

        info!(
            path = %self.path.display(),
            total,
            "Saved analysis result"
        );
        Ok(())
    }

    async fn load(&self) -> StorageResult<ResultLog> {
        let raw = {
            let lock = path_lock(&self.path);
            let _guard = lock.lock().await;
            self.read_or_init().await?
        };

        let mut log = ResultLog::default();
        for (index, entry) in raw.analyses.into_iter().enumerate() {
            match serde_json::from_value::<AnalysisRecord>(entry) {
                Ok(record) => log.push(record),
                Err(e) => warn!(index, error = %e, "Skipping unreadable result entry"),
            }
        }
        Ok(log)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Append-only JSON-lines result log.
#[derive(Debug, Clone)]
pub struct JsonLinesResultLog {
    path: PathBuf,
}

impl JsonLinesResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Number of non-blank lines currently in the log.
    async fn stored_lines(&self) -> StorageResult<usize> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StorageError::persistence(format!("read {}: {}", self.path.display(), e)))?;
        Ok(text.lines().filter(|line| !line.trim().is_empty()).count())
    }
}

#[async_trait]
impl ResultSink for JsonLinesResultLog {
    async fn append(&self, record: &AnalysisRecord) -> StorageResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let lock = path_lock(&self.path);
        let _guard = lock.lock().await;

        ensure_parent(&self.path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                StorageError::persistence(format!("open {}: {}", self.path.display(), e))
            })?;

        file.write_all(&line)
            .await
            .map_err(|e| StorageError::persistence(format!("append {}: {}", self.path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| StorageError::persistence(format!("flush {}: {}", self.path.display(), e)))?;

        let total = self.stored_lines().await?;
        info!(path = %self.path.display(), total, "Appended analysis result");
        Ok(())
    }

    async fn load(&self) -> StorageResult<ResultLog> {
        let lock = path_lock(&self.path);
        let _guard = lock.lock().await;

        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ResultLog::default()),
            Err(e) => {
                return Err(StorageError::persistence(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut log = ResultLog::default();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnalysisRecord>(line) {
                Ok(record) => log.push(record),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed result line"),
            }
        }
        Ok(log)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vtag_models::{AnalysisResult, VideoSource};

    fn record(name: &str) -> AnalysisRecord {
        AnalysisRecord::new(
            &VideoSource::local(name),
            AnalysisResult {
                summary: format!("{} 요약", name),
                tags: vec!["태그".to_string()],
                category: "게임".to_string(),
            },
        )
    }

    fn file_paths(log: &ResultLog) -> Vec<String> {
        log.analyses
            .iter()
            .map(|r| match &r.video_source {
                vtag_models::SourceDescriptor::Local { file_path } => file_path.clone(),
                other => panic!("unexpected source {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_append_then_reload_preserves_order() {
        let dir = TempDir::new().unwrap();
        let sink = JsonResultLog::new(dir.path().join("results.json"));

        for name in ["1.mp4", "2.mp4", "3.mp4"] {
            sink.append(&record(name)).await.unwrap();
        }

        let log = sink.load().await.unwrap();
        assert_eq!(file_paths(&log), vec!["1.mp4", "2.mp4", "3.mp4"]);
    }

    #[tokio::test]
    async fn test_corrupt_log_is_reinitialized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let sink = JsonResultLog::new(&path);
        sink.append(&record("new.mp4")).await.unwrap();

        let log = sink.load().await.unwrap();
        assert_eq!(file_paths(&log), vec!["new.mp4"]);
    }

    #[tokio::test]
    async fn test_unknown_shape_is_reinitialized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        tokio::fs::write(&path, br#"{"results": []}"#).await.unwrap();

        let sink = JsonResultLog::new(&path);
        sink.append(&record("a.mp4")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(raw["analyses"].as_array().unwrap().len(), 1);
        assert!(raw.get("results").is_none());
    }

    #[tokio::test]
    async fn test_prior_history_in_legacy_format_survives_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("video_analysis_result.json");
        tokio::fs::write(
            &path,
            r#"{"analyses": [{
                "timestamp": "2024-05-01T12:00:00.123456",
                "video_source": {"type": "local", "file_path": "old.mp4"},
                "analysis_result": {"summary": "예전 요약", "tags": ["게임"], "category": "게임"}
            }]}"#,
        )
        .await
        .unwrap();

        let sink = JsonResultLog::new(&path);
        sink.append(&record("new.mp4")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        let entries = raw["analyses"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["timestamp"], "2024-05-01T12:00:00.123456");

        let log = sink.load().await.unwrap();
        assert_eq!(file_paths(&log), vec!["old.mp4", "new.mp4"]);
    }

    #[tokio::test]
    async fn test_unreadable_entries_are_kept_on_disk_and_skipped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        tokio::fs::write(&path, br#"{"analyses": [{"note": "hand edited"}], "owner": "ops"}"#)
            .await
            .unwrap();

        let sink = JsonResultLog::new(&path);
        sink.append(&record("a.mp4")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(raw["analyses"].as_array().unwrap().len(), 2);
        assert_eq!(raw["analyses"][0]["note"], "hand edited");
        assert_eq!(raw["owner"], "ops");

        let log = sink.load().await.unwrap();
        assert_eq!(file_paths(&log), vec!["a.mp4"]);
    }

    #[test]
    fn test_temp_path_keeps_full_file_name() {
        let dir = Path::new("/data");
        assert_eq!(temp_path(&dir.join("out.a")), dir.join("out.a.tmp"));
        assert_ne!(temp_path(&dir.join("out.a")), temp_path(&dir.join("out.b")));
    }

    #[tokio::test]
    async fn test_sibling_logs_with_shared_stem_stay_separate() {
        let dir = TempDir::new().unwrap();
        let a = JsonResultLog::new(dir.path().join("out.a"));
        let b = JsonResultLog::new(dir.path().join("out.b"));

        let rec_a = record("a.mp4");
        let rec_b = record("b.mp4");
        let (ra, rb) = tokio::join!(a.append(&rec_a), b.append(&rec_b));
        ra.unwrap();
        rb.unwrap();

        assert_eq!(file_paths(&a.load().await.unwrap()), vec!["a.mp4"]);
        assert_eq!(file_paths(&b.load().await.unwrap()), vec!["b.mp4"]);
    }

    #[tokio::test]
    async fn test_writes_non_ascii_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let sink = JsonResultLog::new(&path);

        sink.append(&record("a.mp4")).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("게임"));
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let sink = JsonResultLog::new(dir.path().join("nested").join("results.json"));

        sink.append(&record("a.mp4")).await.unwrap();
        assert_eq!(sink.load().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");

        let mut handles = Vec::new();
        for i in 0..16 {
            // Separate sink instances share the per-path lock.
            let sink = JsonResultLog::new(&path);
            handles.push(tokio::spawn(async move {
                sink.append(&record(&format!("{}.mp4", i))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let log = JsonResultLog::new(&path).load().await.unwrap();
        assert_eq!(log.len(), 16);
    }

    #[tokio::test]
    async fn test_json_lines_append_and_skip_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.jsonl");
        let sink = JsonLinesResultLog::new(&path);

        sink.append(&record("1.mp4")).await.unwrap();
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap()
            .write_all(b"garbage\n")
            .await
            .unwrap();
        sink.append(&record("2.mp4")).await.unwrap();

        let log = sink.load().await.unwrap();
        assert_eq!(file_paths(&log), vec!["1.mp4", "2.mp4"]);
    }

    #[tokio::test]
    async fn test_json_lines_counts_stored_lines() {
        let dir = TempDir::new().unwrap();
        let sink = JsonLinesResultLog::new(dir.path().join("results.jsonl"));

        sink.append(&record("1.mp4")).await.unwrap();
        sink.append(&record("2.mp4")).await.unwrap();

        assert_eq!(sink.stored_lines().await.unwrap(), 2);
    }

    #[test]
    fn test_log_mode_parsing() {
        assert_eq!("snapshot".parse::<LogMode>().unwrap(), LogMode::Snapshot);
        assert_eq!("JSONL".parse::<LogMode>().unwrap(), LogMode::JsonLines);
        assert!("xml".parse::<LogMode>().is_err());
    }

    #[tokio::test]
    async fn test_log_mode_opens_matching_sink() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = LogMode::JsonLines.open(&path);

        sink.append(&record("a.mp4")).await.unwrap();
        assert_eq!(sink.path(), path.as_path());

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
