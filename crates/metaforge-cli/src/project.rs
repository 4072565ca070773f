//! Project directories on disk.
//!
//! A project is loaded into a [`VirtualFs`] keyed by forward-slash relative
//! paths. Paths the agent touches are tracked through a change listener and
//! only those are written back.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use metaforge::{ChangeEvent, VirtualFs};
use walkdir::{DirEntry, WalkDir};

const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target"];

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

/// Read every UTF-8 file under `root`.
pub fn load(root: &Path) -> Result<VirtualFs> {
    let mut files = BTreeMap::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
    {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root)?;
        let Some(key) = virtual_path(relative) else {
            tracing::warn!("Skipping {}: path is not valid UTF-8", relative.display());
            continue;
        };
        match fs::read_to_string(entry.path()) {
            Ok(content) => {
                files.insert(key, content);
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::debug!(path = %key, "skipping binary file");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", entry.path().display()));
            }
        }
    }

    tracing::info!(files = files.len(), root = %root.display(), "loaded project");
    Ok(VirtualFs::from_files(files))
}

fn virtual_path(relative: &Path) -> Option<String> {
    let parts = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Map a store path back under `root`, refusing anything that escapes it.
fn resolve(root: &Path, path: &str) -> Result<PathBuf> {
    let relative = Path::new(path);
    let contained = !path.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !contained {
        bail!("refusing to write outside the project: {path:?}");
    }
    Ok(root.join(relative))
}

/// Paths changed since this tracker was attached.
#[derive(Debug, Clone, Default)]
pub struct DirtyPaths(Arc<Mutex<BTreeSet<String>>>);

impl DirtyPaths {
    /// Start tracking changes to `vfs`.
    pub fn attach(vfs: &mut VirtualFs) -> Self {
        let dirty = Self::default();
        let sink = dirty.clone();
        vfs.add_listener(move |event: &ChangeEvent| sink.record(event));
        dirty
    }

    fn record(&self, event: &ChangeEvent) {
        if let Ok(mut paths) = self.0.lock() {
            paths.extend(event.paths().into_iter().map(str::to_string));
        }
    }

    /// Drain the tracked paths.
    pub fn take(&self) -> BTreeSet<String> {
        self.0
            .lock()
            .map(|mut paths| std::mem::take(&mut *paths))
            .unwrap_or_default()
    }
}

/// What [`persist`] did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Persisted {
    /// Files created or overwritten.
    pub written: usize,
    /// Files removed from disk.
    pub removed: usize,
}

/// Write each dirty path back to disk, deleting those no longer in `vfs`.
///
/// Every path is checked before anything is touched, so a path escaping
/// `root` fails the save with the directory unchanged.
pub fn persist(root: &Path, vfs: &VirtualFs, dirty: &BTreeSet<String>) -> Result<Persisted> {
    let targets = dirty
        .iter()
        .map(|path| Ok((path.as_str(), resolve(root, path)?)))
        .collect::<Result<Vec<_>>>()?;
    let mut persisted = Persisted::default();

    for (path, target) in targets {
        match vfs.read(path) {
            Ok(content) => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                fs::write(&target, content)
                    .with_context(|| format!("failed to write {}", target.display()))?;
                persisted.written += 1;
            }
            Err(_) if target.is_file() => {
                fs::remove_file(&target)
                    .with_context(|| format!("failed to remove {}", target.display()))?;
                persisted.removed += 1;
            }
            Err(_) => {}
        }
    }

    Ok(persisted)
}
