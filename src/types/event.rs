use super::interrupt::{HumanInterrupt, HumanResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Payloads carried in the `data:` line of each run-stream event.

#[derive(Debug, Clone, Deserialize)]
pub struct StartPayload {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    #[serde(alias = "text")]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallPayload {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub step: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolResultPayload {
    pub tool: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub step: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubAgentStartPayload {
    #[serde(alias = "name")]
    pub agent: String,
    #[serde(default)]
    pub request: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubAgentResultPayload {
    #[serde(alias = "name")]
    pub agent: String,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterruptPayload {
    /// Null when the run paused but no task carried interrupt details.
    #[serde(default)]
    pub interrupt: Option<HumanInterrupt>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DonePayload {
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    #[serde(alias = "message", alias = "detail")]
    pub error: String,
}

/// Body of `POST /runs/stream`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunRequest {
    pub thread_id: String,
    pub question: String,
}

/// What a stream is opened for.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRequest {
    Start { thread_id: String, question: String },
    Resume { thread_id: String, response: HumanResponse },
}

impl StreamRequest {
    pub fn thread_id(&self) -> &str {
        match self {
            Self::Start { thread_id, .. } | Self::Resume { thread_id, .. } => thread_id,
        }
    }
}

/// Tool results may be any JSON value; strings are kept verbatim.
pub fn result_text(result: &Value) -> String {
    match result {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
