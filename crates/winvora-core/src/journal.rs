use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One line in the operation journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationRecord {
    pub timestamp: String,
    pub operation: String,
    pub target: String,
    pub success: bool,
    pub detail: String,
}

impl OperationRecord {
    pub fn new(operation: &str, target: &str, success: bool, detail: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            operation: operation.to_owned(),
            target: target.to_owned(),
            success,
            detail: detail.into(),
        }
    }
}

/// Receives a record after every lifecycle, install and launch attempt.
///
/// Errors are reported back to the manager, which logs and ignores them.
pub trait OperationSink: Send + Sync {
    fn record(&self, record: &OperationRecord) -> std::io::Result<()>;
}

/// Appends JSON lines to `operations-YYYYMMDD.jsonl` under a log directory.
pub struct JsonlJournal {
    dir: PathBuf,
}

impl JsonlJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for_today(&self) -> PathBuf {
        let day = chrono::Local::now().format("%Y%m%d");
        self.dir.join(format!("operations-{day}.jsonl"))
    }

    /// Read back every record in one journal file, skipping unparsable lines.
    pub fn read(path: &Path) -> std::io::Result<Vec<OperationRecord>> {
        let content = fs::read_to_string(path)?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl OperationSink for JsonlJournal {
    fn record(&self, record: &OperationRecord) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        // One write per record; O_APPEND keeps concurrent writers' lines whole.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for_today())?;
        file.write_all(line.as_bytes())
    }
}

/// Keeps records in memory. Useful for embedding and tests.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<OperationRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OperationRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl OperationSink for MemorySink {
    fn record(&self, record: &OperationRecord) -> std::io::Result<()> {
        self.records
            .lock()
            .map_err(|_| std::io::Error::other("memory sink poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

impl<T: OperationSink + ?Sized> OperationSink for std::sync::Arc<T> {
    fn record(&self, record: &OperationRecord) -> std::io::Result<()> {
        (**self).record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JsonlJournal::new(dir.path().join("logs"));
        journal
            .record(&OperationRecord::new("create", "games", true, "ready"))
            .unwrap();
        journal
            .record(&OperationRecord::new("delete", "games", false, "busy"))
            .unwrap();

        let path = journal.file_for_today();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("operations-"));
        let records = JsonlJournal::read(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].operation, "create");
        assert!(records[0].success);
        assert_eq!(records[1].detail, "busy");
        assert!(!records[1].success);
    }

    #[test]
    fn jsonl_read_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operations-20250101.jsonl");
        let good = serde_json::to_string(&OperationRecord::new("run", "p", true, "")).unwrap();
        fs::write(&path, format!("{good}\nnot json\n")).unwrap();
        assert_eq!(JsonlJournal::read(&path).unwrap().len(), 1);
    }

    #[test]
    fn unwritable_dir_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, "file, not a dir").unwrap();
        let journal = JsonlJournal::new(&blocker);
        assert!(journal
            .record(&OperationRecord::new("create", "x", true, ""))
            .is_err());
    }

    #[test]
    fn memory_sink_collects() {
        let sink = MemorySink::new();
        sink.record(&OperationRecord::new("install", "office", true, "exit 0"))
            .unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, "office");
    }
}
