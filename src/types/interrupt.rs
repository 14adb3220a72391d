use super::args::ToolArgs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActionRequest {
    pub fn typed_args(&self) -> Option<ToolArgs> {
        ToolArgs::parse(&self.action, &Value::Object(self.args.clone())).ok()
    }
}

/// Which response kinds the reviewer may submit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InterruptConfig {
    #[serde(default)]
    pub allow_accept: bool,
    #[serde(default)]
    pub allow_edit: bool,
    #[serde(default)]
    pub allow_respond: bool,
    #[serde(default)]
    pub allow_ignore: bool,
}

impl InterruptConfig {
    pub fn all() -> Self {
        Self {
            allow_accept: true,
            allow_edit: true,
            allow_respond: true,
            allow_ignore: true,
        }
    }

    pub fn allows(&self, kind: ResponseKind) -> bool {
        match kind {
            ResponseKind::Accept => self.allow_accept,
            ResponseKind::Edit => self.allow_edit,
            ResponseKind::Respond => self.allow_respond,
            ResponseKind::Ignore => self.allow_ignore,
        }
    }

    pub fn allowed_kinds(&self) -> Vec<ResponseKind> {
        ResponseKind::ALL
            .into_iter()
            .filter(|kind| self.allows(*kind))
            .collect()
    }
}

const UNKNOWN_ACTION: &str = "unknown";

/// A paused run waiting on a human decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HumanInterrupt {
    pub action_request: ActionRequest,
    #[serde(default)]
    pub config: InterruptConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HumanInterrupt {
    /// Stand-in for a pause the backend reported without details; any
    /// response kind is accepted.
    pub fn unknown() -> Self {
        Self {
            action_request: ActionRequest {
                action: UNKNOWN_ACTION.to_string(),
                args: Map::new(),
            },
            config: InterruptConfig::all(),
            description: Some("Run paused without saying what it needs".to_string()),
        }
    }

    pub fn action(&self) -> &str {
        &self.action_request.action
    }

    /// Backend description, or one generated from the action and its arguments.
    pub fn display_description(&self) -> String {
        if let Some(description) = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            return description.to_string();
        }
        describe_action(&self.action_request)
    }
}

fn describe_action(request: &ActionRequest) -> String {
    let arg = |keys: &[&str], fallback: &str| -> String {
        keys.iter()
            .find_map(|key| request.args.get(*key))
            .map(value_text)
            .unwrap_or_else(|| fallback.to_string())
    };

    match request.action.as_str() {
        "send-mail" => format!(
            "Send email to {}: \"{}\"",
            arg(&["to", "toRecipients"], "unknown"),
            arg(&["subject"], "no subject")
        ),
        "create-calendar-event" | "create-specific-calendar-event" => format!(
            "Create calendar event: \"{}\" at {}",
            arg(&["subject"], "Untitled event"),
            arg(&["start", "startDateTime"], "unknown")
        ),
        "Question" => format!("Agent is asking: {}", arg(&["question"], "")),
        action => {
            let preview = request
                .args
                .iter()
                .take(3)
                .map(|(key, value)| format!("{key}={}", value_text(value)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{action}({preview})")
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Accept,
    Ignore,
    Edit,
    Respond,
}

impl ResponseKind {
    pub const ALL: [ResponseKind; 4] = [Self::Accept, Self::Edit, Self::Respond, Self::Ignore];

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Ignore => "ignore",
            Self::Edit => "edit",
            Self::Respond => "response",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// The reviewer's answer to an interrupt.
///
/// Serialized as `{"type": ..., "args": ...}` where `args` is null for
/// accept/ignore, the text for a response, and an action request for an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ResponsePayload", try_from = "ResponsePayload")]
pub enum HumanResponse {
    Accept,
    Ignore,
    Edit {
        action: String,
        args: Map<String, Value>,
    },
    Respond {
        text: String,
    },
}

impl HumanResponse {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Self::Accept => ResponseKind::Accept,
            Self::Ignore => ResponseKind::Ignore,
            Self::Edit { .. } => ResponseKind::Edit,
            Self::Respond { .. } => ResponseKind::Respond,
        }
    }

    pub fn respond(text: impl Into<String>) -> Self {
        Self::Respond { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResponsePayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    args: Value,
}

impl From<HumanResponse> for ResponsePayload {
    fn from(response: HumanResponse) -> Self {
        let kind = response.kind().as_wire().to_string();
        let args = match response {
            HumanResponse::Accept | HumanResponse::Ignore => Value::Null,
            HumanResponse::Respond { text } => Value::String(text),
            HumanResponse::Edit { action, args } => {
                let mut request = Map::new();
                request.insert("action".to_string(), Value::String(action));
                request.insert("args".to_string(), Value::Object(args));
                Value::Object(request)
            }
        };
        Self { kind, args }
    }
}

impl TryFrom<ResponsePayload> for HumanResponse {
    type Error = String;

    fn try_from(payload: ResponsePayload) -> Result<Self, Self::Error> {
        match payload.kind.as_str() {
            "accept" => Ok(Self::Accept),
            "ignore" => Ok(Self::Ignore),
            "response" | "respond" => match payload.args {
                Value::String(text) => Ok(Self::Respond { text }),
                other => Err(format!("response args must be a string, got {other}")),
            },
            "edit" => {
                let request: ActionRequest = serde_json::from_value(payload.args)
                    .map_err(|e| format!("edit args must be an action request: {e}"))?;
                Ok(Self::Edit {
                    action: request.action,
                    args: request.args,
                })
            }
            other => Err(format!("unknown response type '{other}'")),
        }
    }
}
