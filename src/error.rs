use crate::state::SessionPhase;
use crate::types::{ArgsError, ResponseKind, ThreadStatus};
use thiserror::Error;

/// Failures of the stream manager surfaced to callers and subscribers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Stream could not be opened or dropped before a terminal event.
    #[error("connection error: {0}")]
    Connection(String),
    #[error("invalid resume for thread '{thread_id}': {reason}")]
    InvalidResume {
        thread_id: String,
        reason: InvalidResumeReason,
    },
    #[error("thread '{0}' is already streaming")]
    DuplicateStart(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidResumeReason {
    #[error("no session exists")]
    NoSession,
    #[error("session is {0}, not interrupted")]
    NotInterrupted(SessionPhase),
    #[error("'{0}' responses are not allowed by this interrupt")]
    Disallowed(ResponseKind),
    #[error("edit targets '{submitted}' but the pending action is '{pending}'")]
    ActionMismatch { pending: String, submitted: String },
    #[error("backend reports the thread as {0}")]
    NotInterruptedOnServer(ThreadStatus),
}

/// A single stream event that could not be understood. Never fatal to a session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized event '{0}'")]
    UnknownEvent(String),
    #[error("malformed '{event}' payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid '{event}' arguments: {source}")]
    Args {
        event: String,
        #[source]
        source: ArgsError,
    },
}
