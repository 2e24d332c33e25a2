//! User feedback persistence.
//!
//! Predictions the user confirms or corrects are appended to a CSV
//! log. The file is created on first write with its header; appends
//! are serialized so rows land in call order.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;

pub const FEEDBACK_HEADER: &str = "predicted,is_correct,actual,timestamp";

#[derive(Debug, Clone)]
pub struct FeedbackRecord {
    pub predicted: String,
    pub is_correct: bool,
    pub actual: String,
    pub timestamp: String,
}

impl FeedbackRecord {
    /// Stamps the record at creation so the log carries arrival time,
    /// not write time.
    pub fn new(predicted: String, is_correct: bool, actual: String) -> FeedbackRecord {
        FeedbackRecord {
            predicted,
            is_correct,
            actual,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub trait FeedbackSink: Send + Sync {
    fn append(&self, record: &FeedbackRecord) -> std::io::Result<()>;
}

pub struct CsvFeedbackSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvFeedbackSink {
    pub fn new(path: PathBuf) -> CsvFeedbackSink {
        CsvFeedbackSink {
            path,
            lock: Mutex::new(()),
        }
    }
}

impl FeedbackSink for CsvFeedbackSink {
    fn append(&self, record: &FeedbackRecord) -> std::io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let write_header = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if write_header {
            writeln!(file, "{}", FEEDBACK_HEADER)?;
        }
        writeln!(
            file,
            "{},{},{},{}",
            record.predicted, record.is_correct, record.actual, record.timestamp
        )?;

        log::info!(
            "Recorded feedback: predicted={} is_correct={} actual={}",
            record.predicted,
            record.is_correct,
            record.actual
        );
        Ok(())
    }
}
