use super::stream::SseFrame;
use crate::error::DecodeError;
use crate::state::StepKind;
use crate::types::{
    result_text, DonePayload, ErrorPayload, HumanInterrupt, InterruptPayload, MessagePayload,
    StartPayload, SubAgentResultPayload, SubAgentStartPayload, ToolArgs, ToolCallPayload,
    ToolResultPayload,
};
use serde::de::DeserializeOwned;

/// What a single run-stream event means for the session consuming it.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Step(StepKind),
    Interrupt(HumanInterrupt),
    FinalAnswer { answer: String },
    Error { message: String },
    /// Run finished without an answer payload.
    Done,
}

impl Signal {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Step(_))
    }
}

/// Decode one frame. `Ok(None)` means the event was recognized but carries
/// nothing for the log (the `start` acknowledgement).
pub fn decode(frame: &SseFrame) -> Result<Option<Signal>, DecodeError> {
    let signal = match frame.event.as_str() {
        "start" => {
            let _: StartPayload = payload(frame)?;
            return Ok(None);
        }
        "status" => {
            let status: MessagePayload = payload(frame)?;
            Signal::Step(StepKind::Status {
                message: status.message,
            })
        }
        "thinking" => {
            let thinking: MessagePayload = payload(frame)?;
            Signal::Step(StepKind::Thinking {
                message: thinking.message,
            })
        }
        "tool_call" => {
            let call: ToolCallPayload = payload(frame)?;
            ToolArgs::parse(&call.tool, &call.args).map_err(|source| DecodeError::Args {
                event: frame.event.clone(),
                source,
            })?;
            Signal::Step(StepKind::ToolCall {
                tool: call.tool,
                args: call.args,
            })
        }
        "tool_result" => {
            let result: ToolResultPayload = payload(frame)?;
            Signal::Step(StepKind::ToolResult {
                tool: result.tool,
                result: result_text(&result.result),
            })
        }
        "sub_agent_start" => {
            let start: SubAgentStartPayload = payload(frame)?;
            let message = match start.request.as_deref().map(str::trim) {
                Some(request) if !request.is_empty() => {
                    format!("{} started: {request}", start.agent)
                }
                _ => format!("{} started", start.agent),
            };
            Signal::Step(StepKind::Status { message })
        }
        "sub_agent_result" => {
            let result: SubAgentResultPayload = payload(frame)?;
            Signal::Step(StepKind::ToolResult {
                tool: result.agent,
                result: result_text(&result.result),
            })
        }
        "interrupt" => {
            let interrupt: InterruptPayload = payload(frame)?;
            Signal::Interrupt(interrupt.interrupt.unwrap_or_else(HumanInterrupt::unknown))
        }
        "done" => {
            let done: DonePayload = payload(frame)?;
            match done.answer {
                Some(answer) => Signal::FinalAnswer { answer },
                None => Signal::Done,
            }
        }
        "error" => {
            let error: ErrorPayload = payload(frame)?;
            Signal::Error {
                message: error.error,
            }
        }
        other => return Err(DecodeError::UnknownEvent(other.to_string())),
    };

    Ok(Some(signal))
}

fn payload<T: DeserializeOwned>(frame: &SseFrame) -> Result<T, DecodeError> {
    serde_json::from_str(&frame.data).map_err(|source| DecodeError::Payload {
        event: frame.event.clone(),
        source,
    })
}
