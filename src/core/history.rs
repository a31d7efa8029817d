// src/core/history.rs

//! In-memory line history with a bounded length and a line-oriented file format.

use crate::constants::DEFAULT_MAX_HISTORY;
use crate::system::error::{SysError, SysResult};
use nix::errno::Errno;
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    max_len: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl History {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_len,
        }
    }

    /// Appends `line`, dropping the oldest entry when full. A line equal to the most recent
    /// entry is not stored twice. Returns whether the line was stored.
    pub fn add(&mut self, line: &str) -> bool {
        if self.max_len == 0 || self.entries.back().is_some_and(|last| last == line) {
            return false;
        }
        if self.entries.len() == self.max_len {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
        true
    }

    /// Changes the capacity, discarding the oldest entries that no longer fit. Zero is rejected.
    pub fn set_max_len(&mut self, max_len: usize) -> SysResult<()> {
        if max_len == 0 {
            return Err(SysError::os("history", Errno::EINVAL));
        }
        while self.entries.len() > max_len {
            self.entries.pop_front();
        }
        self.max_len = max_len;
        Ok(())
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry `back` steps before the most recent one (0 is the most recent).
    pub fn recent(&self, back: usize) -> Option<&str> {
        let index = self.entries.len().checked_sub(back + 1)?;
        self.entries.get(index).map(String::as_str)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Appends every line of `path` as an entry. Returns how many lines were read.
    pub fn load(&mut self, path: &Path) -> SysResult<usize> {
        let content = fs::read_to_string(path).map_err(|source| SysError::EditorIo {
            action: "load history from",
            target: path.display().to_string(),
            source,
        })?;
        let mut count = 0;
        for line in content.lines() {
            self.add(line);
            count += 1;
        }
        log::debug!("Loaded {} history line(s) from '{}'", count, path.display());
        Ok(count)
    }

    /// Writes every entry to `path`, one per line, replacing the file. A new file is readable by
    /// its owner only.
    pub fn save(&self, path: &Path) -> SysResult<()> {
        let editor_io = |source| SysError::EditorIo {
            action: "save history to",
            target: path.display().to_string(),
            source,
        };
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(editor_io)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            // One entry per line, whatever the entry contains.
            writeln!(writer, "{}", entry.replace(['\n', '\r'], " ")).map_err(editor_io)?;
        }
        writer.flush().map_err(editor_io)?;
        log::debug!(
            "Saved {} history line(s) to '{}'",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }
}
