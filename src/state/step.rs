use serde::{Deserialize, Serialize};

pub type StepId = u64;

/// One entry of a session's append-only progress log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub id: StepId,
    #[serde(flatten)]
    pub kind: StepKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Agent reasoning text.
    Thinking { message: String },
    /// Progress notification.
    Status { message: String },
    /// Tool invocation announced by the backend.
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// Tool output, kept in full.
    ToolResult { tool: String, result: String },
}

/// Default short rendering of a step body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPreview {
    pub text: String,
    pub truncated: bool,
}

impl Step {
    pub fn tool(&self) -> Option<&str> {
        match &self.kind {
            StepKind::ToolCall { tool, .. } | StepKind::ToolResult { tool, .. } => Some(tool),
            StepKind::Thinking { .. } | StepKind::Status { .. } => None,
        }
    }

    /// Full body text; tool-call args are rendered as compact JSON.
    pub fn body(&self) -> String {
        match &self.kind {
            StepKind::Thinking { message } | StepKind::Status { message } => message.clone(),
            StepKind::ToolCall { args, .. } => args.to_string(),
            StepKind::ToolResult { result, .. } => result.clone(),
        }
    }

    pub fn preview(&self, max_chars: usize) -> StepPreview {
        let body = self.body();
        match body.char_indices().nth(max_chars) {
            Some((cut, _)) => StepPreview {
                text: format!("{}...", &body[..cut]),
                truncated: true,
            },
            None => StepPreview {
                text: body,
                truncated: false,
            },
        }
    }
}
