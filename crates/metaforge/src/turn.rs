//! One agent turn: parse a response, run its tools, build the next context.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::lpml::{self, ParseWarning};
use crate::tools::{Interrupt, RenderSurface, ToolExecutor, ToolResult};
use crate::vfs::VirtualFs;

/// An image handed to the agent alongside its next context block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Always `image/png` for screenshots.
    pub mime_type: &'static str,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

/// What a turn produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// One result per executed tool.
    pub results: Vec<ToolResult>,
    /// How the agent ended the turn, if it did.
    pub interrupt: Option<Interrupt>,
    /// Parser recoveries in the response.
    pub warnings: Vec<ParseWarning>,
}

impl TurnOutcome {
    /// True when the agent asked a question or finished.
    ///
    /// Otherwise the host sends [`context`](Self::context) back and the
    /// agent keeps going.
    pub fn is_final(&self) -> bool {
        self.interrupt.is_some()
    }

    /// The `<tool_outputs>` block for the next request.
    pub fn context(&self) -> Option<String> {
        render_tool_outputs(&self.results)
    }

    /// Screenshots captured this turn.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.results
            .iter()
            .filter_map(|result| result.payload.clone())
            .map(|data| Attachment {
                mime_type: "image/png",
                data,
            })
            .collect()
    }
}

/// Render results as the context block fed back to the agent.
///
/// Returns `None` when there is nothing to report.
pub fn render_tool_outputs(results: &[ToolResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let lines: Vec<String> = results.iter().map(ToolResult::context_line).collect();
    Some(format!("<tool_outputs>\n{}\n</tool_outputs>", lines.join("\n")))
}

/// Owns a project's files and applies agent responses to them.
#[derive(Debug)]
pub struct Engine {
    fs: VirtualFs,
    executor: ToolExecutor,
}

impl Engine {
    /// Create an engine over `fs`.
    pub fn new(fs: VirtualFs, config: EngineConfig) -> Self {
        Self {
            fs,
            executor: ToolExecutor::new(config),
        }
    }

    /// Attach a preview surface.
    pub fn with_surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.executor = self.executor.with_surface(surface);
        self
    }

    /// Abandon screenshot waits once `cancel` becomes true.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.executor = self.executor.with_cancellation(cancel);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        self.executor.config()
    }

    /// Current project files.
    pub fn fs(&self) -> &VirtualFs {
        &self.fs
    }

    /// Mutable access, e.g. to register change listeners.
    pub fn fs_mut(&mut self) -> &mut VirtualFs {
        &mut self.fs
    }

    /// Give back the files.
    pub fn into_fs(self) -> VirtualFs {
        self.fs
    }

    /// Apply one agent response.
    pub async fn run_turn(&mut self, response: &str) -> TurnOutcome {
        let document = lpml::parse_document(response, &self.executor.config().parse);
        for warning in &document.warnings {
            tracing::warn!(?warning, "recovered while parsing response");
        }

        let execution = self.executor.execute(&mut self.fs, &document.nodes).await;
        tracing::info!(
            tools = execution.results.len(),
            failed = execution.results.iter().filter(|r| !r.is_success()).count(),
            interrupted = execution.interrupt.is_some(),
            "turn complete"
        );

        TurnOutcome {
            results: execution.results,
            interrupt: execution.interrupt,
            warnings: document.warnings,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tools::InterruptKind;

    #[test]
    fn test_render_tool_outputs() {
        let results = vec![
            ToolResult::success("delete_file", "Deleted a.txt", "Deleted a.txt"),
            ToolResult::error("move_file", "file not found: b.txt"),
        ];

        assert_eq!(
            render_tool_outputs(&results).unwrap(),
            "<tool_outputs>\n[delete_file] Deleted a.txt\n[System Error] <move_file>: file not found: b.txt\n</tool_outputs>"
        );
        assert_eq!(render_tool_outputs(&[]), None);
    }

    #[tokio::test]
    async fn test_turn_without_tools_has_no_context() {
        let mut engine = Engine::new(VirtualFs::new(), EngineConfig::default());
        let outcome = engine.run_turn("<finish>All done.</finish>").await;

        assert!(outcome.is_final());
        assert_eq!(outcome.context(), None);
        assert_eq!(outcome.interrupt.unwrap().kind, InterruptKind::Finish);
    }

    #[tokio::test]
    async fn test_turn_collects_parse_warnings() {
        let mut engine = Engine::new(VirtualFs::new(), EngineConfig::default());
        let outcome = engine.run_turn("stray </div> then <list_files />").await;

        assert!(!outcome.is_final());
        assert_eq!(
            outcome.warnings,
            vec![ParseWarning::UnmatchedEndTag {
                tag: "div".to_string()
            }]
        );
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn test_attachments_from_payloads() {
        let outcome = TurnOutcome {
            results: vec![
                ToolResult::success("list_files", "", "Listed 0 files"),
                ToolResult::success("take_screenshot", "Captured.", "Screenshot captured")
                    .with_payload(vec![7, 7]),
            ],
            ..Default::default()
        };

        assert_eq!(
            outcome.attachments(),
            vec![Attachment {
                mime_type: "image/png",
                data: vec![7, 7]
            }]
        );
    }
}
