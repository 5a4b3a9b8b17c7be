//! Conversation log.
//!
//! Stores relayed input/output pairs as daily JSONL files
//! (`{dir}/{YYYY-MM-DD}.jsonl`). Writes are best-effort: a failing log never
//! fails the request that produced it.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub timestamp: String,
    /// `chat` or `notification`.
    pub kind: String,
    pub input_text: String,
    pub output_text: String,
}

pub struct ConversationLog {
    dir: PathBuf,
    enabled: bool,
}

impl ConversationLog {
    pub fn new(dir: PathBuf, enabled: bool) -> Self {
        Self { dir, enabled }
    }

    /// Resolve `today` to the local date; anything else passes through.
    pub fn resolve_date(date: &str) -> String {
        if date == "today" {
            Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.to_string()
        }
    }

    fn file_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", Self::resolve_date(date)))
    }

    /// Append one exchange to today's file.
    pub fn record(&self, kind: &str, input_text: &str, output_text: &str) {
        if !self.enabled {
            return;
        }

        let record = ConversationRecord {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            kind: kind.to_string(),
            input_text: input_text.to_string(),
            output_text: output_text.to_string(),
        };

        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!("Failed to create conversation log dir: {e}");
            return;
        }

        let path = self.file_for("today");
        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => match serde_json::to_string(&record) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        error!("Failed to write conversation record: {e}");
                    } else {
                        debug!("Saved conversation record to {}", path.display());
                    }
                }
                Err(e) => error!("Failed to serialize conversation record: {e}"),
            },
            Err(e) => error!("Failed to open conversation log: {e}"),
        }
    }

    /// Load all records for a date (`today` or `YYYY-MM-DD`).
    /// Malformed lines are skipped.
    pub fn load(&self, date: &str) -> Vec<ConversationRecord> {
        let path = self.file_for(date);
        let Ok(file) = fs::File::open(&path) else {
            return Vec::new();
        };

        std::io::BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(&line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("Skipping malformed conversation line: {e}");
                    None
                }
            })
            .collect()
    }
}
