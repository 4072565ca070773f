//! In-memory project file store.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::edit::{EditMode, split_lines};

/// Errors that can occur during file store operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    /// File not found
    #[error("file not found: {0}")]
    NotFound(String),
    /// Move target already exists
    #[error("destination {0} already exists; delete it first if you want to overwrite")]
    DestinationExists(String),
    /// Edit mode is not one of `replace`, `insert_after`, `delete`
    #[error("unknown edit mode: {0}")]
    UnknownEditMode(String),
    /// Edit reaches too far past the end of the file
    #[error("line {line} is out of range: file has {len} lines")]
    LineOutOfRange {
        /// Requested line
        line: usize,
        /// Current line count
        len: usize,
    },
}

/// A mutation that has just been applied to a [`VirtualFs`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A file was created or overwritten.
    Written {
        /// Path written.
        path: String,
    },
    /// A file was edited line-wise.
    Edited {
        /// Path edited.
        path: String,
    },
    /// A file was removed.
    Deleted {
        /// Path removed.
        path: String,
    },
    /// A file was renamed.
    Moved {
        /// Old path.
        from: String,
        /// New path.
        to: String,
    },
}

impl ChangeEvent {
    /// Paths touched by this change.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            ChangeEvent::Written { path }
            | ChangeEvent::Edited { path }
            | ChangeEvent::Deleted { path } => vec![path],
            ChangeEvent::Moved { from, to } => vec![from, to],
        }
    }
}

/// Handle returned by [`VirtualFs::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// In-memory project filesystem.
///
/// Files are kept in a sorted map, so [`list`](Self::list) is already in
/// lexicographic order. Every successful mutation is followed by a
/// synchronous call to each registered listener.
///
/// # Example
///
/// ```rust
/// use metaforge::vfs::{EditMode, VirtualFs};
///
/// let mut fs = VirtualFs::new();
/// fs.write("notes.txt", "one\ntwo\nthree");
/// fs.edit_lines("notes.txt", 2, 2, EditMode::Replace, "TWO").unwrap();
///
/// assert_eq!(fs.read("notes.txt").unwrap(), "one\nTWO\nthree");
/// ```
#[derive(Default)]
pub struct VirtualFs {
    files: BTreeMap<String, String>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl fmt::Debug for VirtualFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFs")
            .field("files", &self.files.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl VirtualFs {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with files. No listeners are notified.
    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(path, content)| (path.into(), content.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Register a change listener.
    ///
    /// Listeners run synchronously after each mutation. A listener that
    /// panics is logged and skipped; the mutation still stands.
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn notify(&self, event: ChangeEvent) {
        for (id, listener) in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::error!(listener = id.0, ?event, "change listener panicked");
            }
        }
    }

    /// Check whether a file exists.
    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Read a whole file.
    pub fn read(&self, path: &str) -> Result<&str, FsError> {
        self.files
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Read lines `start..=end` (1-based), clamped to the file.
    ///
    /// Returns an empty list if `start` is past the last line.
    pub fn read_lines(&self, path: &str, start: usize, end: usize) -> Result<Vec<String>, FsError> {
        let lines = split_lines(self.read(path)?);
        let from = start.saturating_sub(1);
        let to = end.min(lines.len());
        if from >= lines.len() || from >= to {
            return Ok(Vec::new());
        }
        Ok(lines[from..to].to_vec())
    }

    /// Create or overwrite a file.
    pub fn write(&mut self, path: &str, content: impl Into<String>) -> String {
        let content = content.into();
        let status = format!("Wrote {} bytes to {}", content.len(), path);
        self.files.insert(path.to_string(), content);
        self.notify(ChangeEvent::Written {
            path: path.to_string(),
        });
        status
    }

    /// Delete a file. Deleting a missing file is not an error.
    pub fn delete(&mut self, path: &str) -> String {
        if self.files.remove(path).is_none() {
            return format!("File {path} did not exist.");
        }
        self.notify(ChangeEvent::Deleted {
            path: path.to_string(),
        });
        format!("Deleted {path}")
    }

    /// Rename a file. Never overwrites an existing destination.
    pub fn rename(&mut self, path: &str, new_path: &str) -> Result<String, FsError> {
        if !self.exists(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        if self.exists(new_path) {
            return Err(FsError::DestinationExists(new_path.to_string()));
        }
        if let Some(content) = self.files.remove(path) {
            self.files.insert(new_path.to_string(), content);
        }
        self.notify(ChangeEvent::Moved {
            from: path.to_string(),
            to: new_path.to_string(),
        });
        Ok(format!("Moved {path} to {new_path}"))
    }

    /// All paths, sorted.
    pub fn list(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the store has no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Borrow the whole path → content map.
    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    /// Consume the store, returning its files.
    pub fn into_files(self) -> BTreeMap<String, String> {
        self.files
    }

    /// Apply a line-indexed edit.
    ///
    /// `new_text` is split on `\n` / `\r\n`; empty text adds no lines. The
    /// file is written back joined with `\n`.
    pub fn edit_lines(
        &mut self,
        path: &str,
        start: usize,
        end: usize,
        mode: EditMode,
        new_text: &str,
    ) -> Result<String, FsError> {
        let content = self
            .files
            .get_mut(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let mut lines = split_lines(content);
        let new_lines = if new_text.is_empty() {
            Vec::new()
        } else {
            split_lines(new_text)
        };
        mode.apply(&mut lines, start, end, new_lines)?;
        *content = lines.join("\n");

        self.notify(ChangeEvent::Edited {
            path: path.to_string(),
        });
        Ok(format!("Edited {path} (Mode: {mode}, Lines: {start}-{end})"))
    }

    /// Like [`edit_lines`](Self::edit_lines), taking the mode by name.
    pub fn edit_lines_str(
        &mut self,
        path: &str,
        start: usize,
        end: usize,
        mode: &str,
        new_text: &str,
    ) -> Result<String, FsError> {
        if !self.exists(path) {
            return Err(FsError::NotFound(path.to_string()));
        }
        let mode = mode.parse()?;
        self.edit_lines(path, start, end, mode, new_text)
    }
}
