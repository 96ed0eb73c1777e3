// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File-backed journal sink
//!
//! Writes one JSON object per line to
//! `<root>/<swarmId>/<runId>/journal.ndjson`. The swarm and run ids come from
//! the control plane, so both pass through [`PathSanitizer`] before touching
//! the filesystem.

use crate::domain::journal::{Journal, JournalEntry, JournalError};
use crate::domain::path_sanitizer::PathSanitizer;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const JOURNAL_FILE_NAME: &str = "journal.ndjson";

pub struct FileJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileJournal {
    /// Open (or create) the journal for one swarm run. A fresh run id is
    /// generated when none is given.
    pub fn open(root: &Path, swarm_id: &str, run_id: Option<&str>) -> Result<Self, JournalError> {
        let run_id = run_id.map(str::to_string).unwrap_or_else(Self::new_run_id);
        let dir = PathSanitizer::new()
            .join_under(root, &[swarm_id, &run_id])
            .map_err(|e| JournalError::InvalidPath(e.to_string()))?;

        std::fs::create_dir_all(&dir)?;
        let path = dir.join(JOURNAL_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!(path = %path.display(), "Opened swarm journal");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Sortable run id: UTC timestamp plus a short random suffix.
    pub fn new_run_id() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &suffix[..8])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a journal file back for replay. Lines that fail to parse are
    /// skipped with a warning so one torn write does not hide the rest.
    pub fn read_entries(path: &Path) -> Result<Vec<JournalEntry>, JournalError> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), line = idx + 1, error = %e, "Skipping unreadable journal line"),
            }
        }
        Ok(entries)
    }
}

impl Journal for FileJournal {
    fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::control_plane::ControlScope;
    use crate::domain::journal::{JournalDirection, JournalSeverity};

    fn entry(entry_type: &str) -> JournalEntry {
        JournalEntry::new(
            "sw1",
            JournalSeverity::Info,
            JournalDirection::Local,
            "lifecycle",
            entry_type,
            "ctrl-1",
            ControlScope::swarm("sw1"),
        )
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let root = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(root.path(), "sw1", Some("run-1")).unwrap();

        journal.append(entry("prepare")).unwrap();
        journal.append(entry("start")).unwrap();

        assert_eq!(journal.path(), root.path().join("sw1").join("run-1").join(JOURNAL_FILE_NAME));
        let entries = FileJournal::read_entries(journal.path()).unwrap();
        let types: Vec<_> = entries.iter().map(|e| e.entry_type.as_str()).collect();
        assert_eq!(types, vec!["prepare", "start"]);
    }

    #[test]
    fn test_path_components_are_sanitized() {
        let root = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(root.path(), "../../escape", Some("run/1")).unwrap();
        assert!(journal.path().starts_with(root.path()));
        assert_eq!(
            journal.path(),
            root.path().join("_.._escape").join("run_1").join(JOURNAL_FILE_NAME)
        );
    }

    #[test]
    fn test_reject_traversal_run_id() {
        let root = tempfile::tempdir().unwrap();
        let result = FileJournal::open(root.path(), "sw1", Some(".."));
        assert!(matches!(result, Err(JournalError::InvalidPath(_))));
    }

    #[test]
    fn test_reopen_appends() {
        let root = tempfile::tempdir().unwrap();
        {
            let journal = FileJournal::open(root.path(), "sw1", Some("run-1")).unwrap();
            journal.append(entry("prepare")).unwrap();
        }
        let journal = FileJournal::open(root.path(), "sw1", Some("run-1")).unwrap();
        journal.append(entry("remove")).unwrap();
        assert_eq!(FileJournal::read_entries(journal.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_read_skips_torn_lines() {
        let root = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(root.path(), "sw1", Some("run-1")).unwrap();
        journal.append(entry("prepare")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(journal.path())
            .unwrap()
            .write_all(b"{\"timestamp\":\n")
            .unwrap();
        journal.append(entry("start")).unwrap();

        assert_eq!(FileJournal::read_entries(journal.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_run_id_shape() {
        let run_id = FileJournal::new_run_id();
        assert_eq!(run_id.len(), "20260101T000000Z-".len() + 8);
        assert!(run_id.ends_with(|c: char| c.is_ascii_hexdigit()));
    }
}
