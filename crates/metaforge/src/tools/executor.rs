//! Sequential tool execution.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::error::ToolError;
use super::plan::{ExecutionPlan, Interrupt, Invocation, ToolKind};
use super::result::ToolResult;
use super::surface::{CaptureRequest, RenderSurface, SurfaceError};
use crate::config::EngineConfig;
use crate::lpml::{Element, Node};
use crate::vfs::{EditMode, VirtualFs};

/// Everything one parsed response produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Execution {
    /// One result per immediate tool, in execution order.
    pub results: Vec<ToolResult>,
    /// The interrupt that ends the turn, if any.
    pub interrupt: Option<Interrupt>,
}

/// Runs the tools in a parsed response against a [`VirtualFs`].
///
/// Tools run one at a time in plan order. A failing tool produces an error
/// result and the batch continues.
pub struct ToolExecutor {
    config: EngineConfig,
    surface: Option<Arc<dyn RenderSurface>>,
    cancel: Option<watch::Receiver<bool>>,
}

impl fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("config", &self.config)
            .field("surface", &self.surface.is_some())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl ToolExecutor {
    /// Create an executor with no preview surface.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            surface: None,
            cancel: None,
        }
    }

    /// Attach the preview surface used by `preview` and `take_screenshot`.
    pub fn with_surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Abandon pending screenshot waits once `cancel` becomes true.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a parsed response.
    pub async fn execute(&self, fs: &mut VirtualFs, tree: &[Node]) -> Execution {
        let plan = ExecutionPlan::build(tree, self.config.interrupt_precedence);
        let mut results = Vec::with_capacity(plan.immediate.len());

        for invocation in &plan.immediate {
            let tag = invocation.kind.tag();
            let result = match self.run(fs, invocation).await {
                Ok(result) => {
                    tracing::debug!(tool = tag, summary = %result.summary, "tool succeeded");
                    result
                }
                Err(e) => {
                    tracing::warn!(tool = tag, error = %e, "tool failed");
                    ToolResult::error(tag, e.to_string())
                }
            };
            results.push(result);
        }

        if let Some(interrupt) = &plan.interrupt {
            tracing::debug!(kind = interrupt.kind.tag(), "turn interrupted");
        }

        Execution {
            results,
            interrupt: plan.interrupt,
        }
    }

    async fn run(
        &self,
        fs: &mut VirtualFs,
        invocation: &Invocation<'_>,
    ) -> Result<ToolResult, ToolError> {
        let element = invocation.element;
        let tag = invocation.kind.tag();

        match invocation.kind {
            ToolKind::CreateFile => {
                let path = required(element, "path")?;
                let status = fs.write(path, element.text());
                Ok(ToolResult::success(tag, status, format!("Created {path}")))
            }
            ToolKind::EditFile => {
                let path = required(element, "path")?;
                let mode = required(element, "mode")?;
                let end = line_number(element, "end")?.ok_or(ToolError::MissingAttribute("end"))?;
                let start = match line_number(element, "start")? {
                    Some(start) => start,
                    None if mode == EditMode::InsertAfter.as_str() => end,
                    None => return Err(ToolError::MissingAttribute("start")),
                };
                let status = fs.edit_lines_str(path, start, end, mode, &element.text())?;
                Ok(ToolResult::success(tag, status.clone(), status))
            }
            ToolKind::DeleteFile => {
                let path = required(element, "path")?;
                let status = fs.delete(path);
                Ok(ToolResult::success(tag, status.clone(), status))
            }
            ToolKind::MoveFile => {
                let path = required(element, "path")?;
                let new_path = required(element, "new_path")?;
                let status = fs.rename(path, new_path)?;
                Ok(ToolResult::success(tag, status.clone(), status))
            }
            ToolKind::ReadFile => {
                let path = required(element, "path")?;
                let start = line_number(element, "start")?.unwrap_or(1).max(1);
                let end = line_number(element, "end")?.unwrap_or(usize::MAX);
                let lines = fs.read_lines(path, start, end)?;
                let body = if element.attr("line_numbers") == Some("false") {
                    lines.join("\n")
                } else {
                    lines
                        .iter()
                        .enumerate()
                        .map(|(i, line)| format!("{} | {line}", start + i))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                Ok(ToolResult::success(
                    tag,
                    format!("{path}:\n{body}"),
                    format!("Read {path} ({} lines)", lines.len()),
                ))
            }
            ToolKind::ListFiles => {
                let files = fs.list();
                Ok(ToolResult::success(
                    tag,
                    files.join(", "),
                    format!("Listed {} files", files.len()),
                ))
            }
            ToolKind::Preview => {
                self.rebuild(fs).await?;
                Ok(ToolResult::success(tag, "Refreshed.", "Preview refreshed"))
            }
            ToolKind::TakeScreenshot => {
                let image = self.screenshot(fs).await?;
                let size = image.len();
                Ok(
                    ToolResult::success(tag, "Captured.", format!("Screenshot captured ({size} bytes)"))
                        .with_payload(image),
                )
            }
        }
    }

    async fn rebuild(&self, fs: &VirtualFs) -> Result<&Arc<dyn RenderSurface>, SurfaceError> {
        let surface = self.surface.as_ref().ok_or(SurfaceError::Unavailable)?;
        surface.rebuild(fs).await?;
        Ok(surface)
    }

    async fn screenshot(&self, fs: &VirtualFs) -> Result<Vec<u8>, SurfaceError> {
        let surface = self.rebuild(fs).await?;
        tokio::time::sleep(self.config.settle_delay).await;

        let (request, reply) = CaptureRequest::new(self.config.screenshot_timeout);
        surface.request_capture(reply)?;

        let outcome = match self.cancel.clone() {
            Some(mut cancel) => request
                .outcome_or_cancel(&mut cancel)
                .await
                .ok_or(SurfaceError::Cancelled)?,
            None => request.outcome().await,
        };
        outcome.into_result()
    }
}

fn required<'a>(element: &'a Element, name: &'static str) -> Result<&'a str, ToolError> {
    element.attr(name).ok_or(ToolError::MissingAttribute(name))
}

fn line_number(element: &Element, name: &'static str) -> Result<Option<usize>, ToolError> {
    element
        .attr(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ToolError::InvalidLineNumber {
                    name,
                    value: value.to_string(),
                })
        })
        .transpose()
}
