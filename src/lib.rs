//! Session streaming manager for an agent inbox: runs several agent threads
//! over server-sent events, keeps each thread's step log, and reconciles
//! locally started threads with the backend's thread list.

pub mod api;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod inbox;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, InboxApi, StreamSource};
pub use config::Config;
pub use error::{DecodeError, InvalidResumeReason, SessionError};
pub use inbox::{Inbox, Resumed};
pub use state::{SessionPhase, SessionUpdate, StreamRegistry, StreamState};
