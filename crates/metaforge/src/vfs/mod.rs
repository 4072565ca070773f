//! Virtual filesystem for project files.
//!
//! This module provides:
//! - [`VirtualFs`] - In-memory path → content store with line-oriented edits
//! - [`EditMode`] - The three line-edit modes (`replace`, `insert_after`, `delete`)
//! - [`ChangeEvent`] - What listeners are told after each mutation
//!
//! Paths are plain keys: exact, case-sensitive, forward-slash separated, with
//! no normalization. There are no directories; a project is a flat map.

mod edit;
mod store;

pub use edit::{EditMode, MAX_PADDING};
pub use store::{ChangeEvent, FsError, ListenerId, VirtualFs};
