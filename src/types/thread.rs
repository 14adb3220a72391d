use super::args::ToolArgs;
use super::interrupt::HumanInterrupt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DONE_TOOL_NAME: &str = "Done";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Idle,
    Busy,
    Interrupted,
    Error,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "busy" => Some(Self::Busy),
            "interrupted" => Some(Self::Interrupted),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary row of the thread list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thread {
    pub thread_id: String,
    pub status: ThreadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_description: Option<String>,
}

impl Thread {
    /// Optimistic local row for a run that the backend may not have persisted yet.
    pub fn provisional(thread_id: impl Into<String>, question: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            status: ThreadStatus::Busy,
            created_at: now,
            updated_at: now,
            question,
            interrupt_description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "empty_object")]
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn typed_args(&self) -> Option<ToolArgs> {
        ToolArgs::parse(&self.name, &self.args).ok()
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "HumanMessage")]
    Human {
        #[serde(default)]
        content: serde_json::Value,
    },
    #[serde(rename = "AIMessage")]
    Ai {
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    #[serde(rename = "ToolMessage")]
    Tool {
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl Message {
    /// Text content; list-shaped content is flattened to its text parts.
    pub fn text(&self) -> String {
        match self {
            Self::Human { content } | Self::Ai { content, .. } | Self::Tool { content, .. } => {
                content_text(content)
            }
            Self::Other => String::new(),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Ai { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                serde_json::Value::String(text) => Some(text.as_str()),
                other => other.get("text").and_then(|text| text.as_str()),
            })
            .collect::<Vec<_>>()
            .join(""),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A `Done` answer located by its position, so equal strings stay distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoneAnswer {
    pub message_index: usize,
    pub call_index: usize,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadDetail {
    pub thread_id: String,
    pub status: ThreadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<HumanInterrupt>,
}

impl ThreadDetail {
    /// Every `Done` answer in message order. The last one is the canonical answer.
    pub fn done_answers(&self) -> Vec<DoneAnswer> {
        let mut answers = Vec::new();
        for (message_index, message) in self.messages.iter().enumerate() {
            for (call_index, call) in message.tool_calls().iter().enumerate() {
                if call.name != DONE_TOOL_NAME {
                    continue;
                }
                if let Some(answer) = call.args.get("answer").and_then(|a| a.as_str()) {
                    answers.push(DoneAnswer {
                        message_index,
                        call_index,
                        answer: answer.to_string(),
                    });
                }
            }
        }
        answers
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|message| {
            message
                .tool_calls()
                .iter()
                .rev()
                .filter(|call| call.name == DONE_TOOL_NAME)
                .find_map(|call| call.args.get("answer").and_then(|a| a.as_str()))
        })
    }
}

/// Body of the non-streaming run/resume endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResponse {
    pub thread_id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub interrupt: Option<HumanInterrupt>,
}
