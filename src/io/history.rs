//! Navigation history log - appends completed trips to file
//!
//! Entries are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::trip::HistoryEntry;
use anyhow::Context;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Append-only JSONL writer for history entries
pub struct HistoryLog {
    file_path: String,
}

impl HistoryLog {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "history_log_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append one entry to the history file
    pub fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        let json = entry.to_json();
        self.append_line(&json)
            .with_context(|| format!("Failed to append history to {}", self.file_path))?;

        info!(
            id = %entry.id,
            end = %entry.end_label,
            route = %entry.route_name,
            status = %entry.status.as_str(),
            "history_recorded"
        );
        Ok(())
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "history_written");

        Ok(())
    }

    /// Read up to `limit` entries, most recent first.
    ///
    /// A missing file is an empty history. Lines that fail to parse are skipped.
    pub fn recent(&self, limit: usize) -> anyhow::Result<Vec<HistoryEntry>> {
        let path = Path::new(&self.file_path);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read history file {}", self.file_path))?;

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(line = %(line_no + 1), error = %e, "history_line_invalid");
                }
            }
        }

        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}
