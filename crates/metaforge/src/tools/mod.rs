//! Tool orchestration for parsed agent responses.
//!
//! The agent requests work with LPML tags. This module decides what each tag
//! means and runs it:
//!
//! - [`ExecutionPlan`] - Classifies top-level elements into immediate tools
//!   and at most one interrupt, and puts `edit_file` calls in a safe order
//! - [`ToolExecutor`] - Runs a plan against a [`VirtualFs`](crate::VirtualFs)
//! - [`RenderSurface`] - The externally owned preview the `preview` and
//!   `take_screenshot` tools talk to
//!
//! # Tag vocabulary
//!
//! ```text
//! create_file      path                         body: file content
//! edit_file        path start end mode          body: new lines
//! delete_file      path
//! move_file        path new_path
//! read_file        path [start] [end] [line_numbers]
//! list_files
//! preview
//! take_screenshot
//! ask / finish                                  body: question / summary
//! thinking / plan / report                      ignored
//! ```

mod error;
mod executor;
mod plan;
mod result;
mod surface;

pub use error::ToolError;
pub use executor::{Execution, ToolExecutor};
pub use plan::{
    ExecutionPlan, Interrupt, InterruptKind, InterruptPrecedence, Invocation, TagClass, ToolKind,
    classify,
};
pub use result::{ToolResult, ToolStatus};
pub use surface::{
    CaptureMessage, CaptureOutcome, CaptureReply, CaptureRequest, RenderSurface, SurfaceError,
    decode_image,
};
