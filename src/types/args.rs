use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Typed view of tool-call and interrupt arguments, keyed by tool name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolArgs {
    SendMail(SendMailArgs),
    CalendarEvent(CalendarEventArgs),
    Question(QuestionArgs),
    Done(DoneArgs),
    SearchEmails(SearchArgs),
    Delegate(DelegateArgs),
    Unknown(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMailArgs {
    #[serde(alias = "toRecipients")]
    pub to: Value,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEventArgs {
    pub subject: String,
    #[serde(alias = "startDateTime")]
    pub start: String,
    #[serde(default, alias = "endDateTime")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionArgs {
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneArgs {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateArgs {
    pub request: String,
}

#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("arguments for '{tool}' must be a JSON object, got {found}")]
    NotAnObject { tool: String, found: &'static str },
    #[error("arguments for '{tool}' do not match its schema: {source}")]
    Schema {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ToolArgs {
    pub fn parse(tool: &str, args: &Value) -> Result<Self, ArgsError> {
        let object = match args {
            Value::Object(object) => object,
            Value::Null => return Ok(Self::Unknown(Map::new())),
            other => {
                return Err(ArgsError::NotAnObject {
                    tool: tool.to_string(),
                    found: json_kind(other),
                })
            }
        };

        match tool {
            "send-mail" => typed(tool, args).map(Self::SendMail),
            "create-calendar-event" | "create-specific-calendar-event" => {
                typed(tool, args).map(Self::CalendarEvent)
            }
            "Question" => typed(tool, args).map(Self::Question),
            "Done" => typed(tool, args).map(Self::Done),
            "search_email_history" | "search_emails" => typed(tool, args).map(Self::SearchEmails),
            "manage_email" | "manage_calendar" => typed(tool, args).map(Self::Delegate),
            _ => Ok(Self::Unknown(object.clone())),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

fn typed<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ArgsError> {
    serde_json::from_value(args.clone()).map_err(|source| ArgsError::Schema {
        tool: tool.to_string(),
        source,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_tools_parse_into_typed_args() {
        let args = ToolArgs::parse("search_emails", &json!({"query": "meetings"})).unwrap();
        assert_eq!(
            args,
            ToolArgs::SearchEmails(SearchArgs {
                query: "meetings".to_string(),
                top_k: None
            })
        );

        let args = ToolArgs::parse(
            "send-mail",
            &json!({"toRecipients": ["a@b.c"], "subject": "Hi"}),
        )
        .unwrap();
        assert!(matches!(args, ToolArgs::SendMail(ref mail) if mail.to == json!(["a@b.c"])));
    }

    #[test]
    fn test_unknown_tool_falls_back_to_bag() {
        let args = ToolArgs::parse("lookup_contact", &json!({"name": "Ann"})).unwrap();
        assert!(!args.is_known());
    }

    #[test]
    fn test_malformed_known_args_are_rejected() {
        assert!(matches!(
            ToolArgs::parse("Done", &json!({"text": "x"})),
            Err(ArgsError::Schema { .. })
        ));
        assert!(matches!(
            ToolArgs::parse("search_emails", &json!("meetings")),
            Err(ArgsError::NotAnObject { found: "a string", .. })
        ));
    }
}
