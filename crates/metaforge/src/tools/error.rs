//! Per-tool failures.

use thiserror::Error;

use super::surface::SurfaceError;
use crate::vfs::FsError;

/// Why a single tool invocation failed.
///
/// These never escape [`ToolExecutor::execute`](super::ToolExecutor::execute);
/// each one becomes an error [`ToolResult`](super::ToolResult).
#[derive(Debug, Error)]
pub enum ToolError {
    /// File store rejected the operation
    #[error(transparent)]
    Fs(#[from] FsError),
    /// Preview or screenshot failed
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    /// A required attribute was not given
    #[error("missing required attribute `{0}`")]
    MissingAttribute(&'static str),
    /// A line-number attribute is not a non-negative integer
    #[error("invalid `{name}` value {value:?}: expected a line number")]
    InvalidLineNumber {
        /// Attribute name
        name: &'static str,
        /// Value as written
        value: String,
    },
}
