//! Metaforge: LPML Tool Engine
//!
//! Metaforge turns the markup an agent writes into its responses into file
//! operations against an in-memory project, and reports what happened back to
//! the agent loop.
//!
//! A turn flows one way:
//!
//! ```text
//! agent text ──► lpml::parse ──► node tree ──► ToolExecutor ──► results
//!                                                  │
//!                                                  ▼
//!                                              VirtualFs
//! ```
//!
//! [`Engine`] bundles the three pieces for callers that drive a full agent
//! loop.

mod config;
mod turn;

pub mod lpml;
pub mod tools;
pub mod vfs;

pub use config::{ConfigError, EngineConfig};
pub use lpml::{Element, Node, ParseOptions};
pub use tools::{
    Execution, Interrupt, InterruptKind, InterruptPrecedence, RenderSurface, SurfaceError,
    ToolError, ToolExecutor, ToolResult, ToolStatus,
};
pub use turn::{Attachment, Engine, TurnOutcome, render_tool_outputs};
pub use vfs::{ChangeEvent, EditMode, FsError, ListenerId, VirtualFs};
