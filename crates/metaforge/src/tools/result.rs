//! Tool results.

use serde::{Deserialize, Serialize};

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// The tool did what was asked.
    Success,
    /// The tool failed; see the message.
    Error,
}

/// Result of one executed tool, reported back to the agent loop.
///
/// `message` is what the agent sees on its next turn (file contents for
/// `read_file`, the path list for `list_files`, the error for failures).
/// `summary` is a short line for people watching the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Success or error.
    pub status: ToolStatus,
    /// Tag of the invocation that produced this result.
    pub tag: String,
    /// Full text for the agent's context.
    pub message: String,
    /// One-line human-facing summary.
    pub summary: String,
    /// Image bytes from `take_screenshot`.
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
}

impl ToolResult {
    /// Create a successful result.
    pub fn success(
        tag: impl Into<String>,
        message: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            status: ToolStatus::Success,
            tag: tag.into(),
            message: message.into(),
            summary: summary.into(),
            payload: None,
        }
    }

    /// Create an error result.
    pub fn error(tag: impl Into<String>, message: impl Into<String>) -> Self {
        let tag = tag.into();
        let message = message.into();
        Self {
            status: ToolStatus::Error,
            summary: format!("Error <{tag}>: {message}"),
            tag,
            message,
            payload: None,
        }
    }

    /// Attach image bytes.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Check if this is a successful result.
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// The line fed back to the agent, e.g. `[delete_file] Deleted a.txt`.
    pub fn context_line(&self) -> String {
        match self.status {
            ToolStatus::Success => format!("[{}] {}", self.tag, self.message),
            ToolStatus::Error => format!("[System Error] <{}>: {}", self.tag, self.message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_success_context_line() {
        let result = ToolResult::success("delete_file", "Deleted a.txt", "Deleted a.txt");

        assert!(result.is_success());
        assert_eq!(result.context_line(), "[delete_file] Deleted a.txt");
    }

    #[test]
    fn test_error_context_line() {
        let result = ToolResult::error("edit_file", "file not found: x.txt");

        assert!(!result.is_success());
        assert_eq!(
            result.context_line(),
            "[System Error] <edit_file>: file not found: x.txt"
        );
        assert_eq!(result.summary, "Error <edit_file>: file not found: x.txt");
    }

    #[test]
    fn test_payload_not_serialized() {
        let result = ToolResult::success("take_screenshot", "Captured.", "Screenshot captured")
            .with_payload(vec![1, 2, 3]);
        let json = serde_json::to_value(&result).expect("serialize");

        assert_eq!(json["status"], "success");
        assert!(json.get("payload").is_none());
    }
}
