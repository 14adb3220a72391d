use super::interrupt::InterruptCoordinator;
use super::step::{Step, StepId, StepKind};
use crate::api::codec::Signal;
use crate::error::{InvalidResumeReason, SessionError};
use crate::types::{HumanInterrupt, HumanResponse, ResponseKind};
use serde::Serialize;
use std::fmt;

/// Snapshot of one thread's streaming progress, as delivered to subscribers.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StreamState {
    pub is_streaming: bool,
    pub steps: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<HumanInterrupt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Streaming,
    Done,
    Interrupted,
    Error,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Streaming)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Interrupted => "interrupted",
            Self::Error => "errored",
        })
    }
}

/// Effect of applying one decoded signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended(StepId),
    Finished(SessionPhase),
    /// The run already reached a terminal state.
    Ignored,
}

/// State machine for one thread: `Streaming -> {Done, Interrupted, Error}`,
/// `Interrupted -> Streaming` on resume.
#[derive(Debug, Clone)]
pub struct StreamSession {
    thread_id: String,
    phase: SessionPhase,
    state: StreamState,
    interrupts: InterruptCoordinator,
    next_step_id: StepId,
}

impl StreamSession {
    pub fn start(thread_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            phase: SessionPhase::Streaming,
            state: StreamState {
                is_streaming: true,
                question: Some(question.into()),
                ..StreamState::default()
            },
            interrupts: InterruptCoordinator::new(),
            next_step_id: 1,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn snapshot(&self) -> StreamState {
        self.state.clone()
    }

    /// Interrupted, or errored before a resumed run acknowledged its answer.
    pub fn awaiting_decision(&self) -> bool {
        match self.phase {
            SessionPhase::Interrupted => true,
            SessionPhase::Error => self.interrupts.is_pending(),
            SessionPhase::Streaming | SessionPhase::Done => false,
        }
    }

    pub fn can_submit(&self, kind: ResponseKind) -> bool {
        self.awaiting_decision()
            && self
                .interrupts
                .pending()
                .is_some_and(|interrupt| InterruptCoordinator::can_submit(interrupt, kind))
    }

    /// Move an interrupted session back to streaming. The step log is kept.
    pub fn begin_resume(&mut self, response: &HumanResponse) -> Result<HumanInterrupt, SessionError> {
        if !self.awaiting_decision() {
            return Err(self.invalid_resume(InvalidResumeReason::NotInterrupted(self.phase)));
        }
        let answered = self
            .interrupts
            .take_for(response)
            .map_err(|reason| self.invalid_resume(reason))?;

        self.phase = SessionPhase::Streaming;
        self.state.is_streaming = true;
        self.state.interrupt = None;
        self.state.final_answer = None;
        self.state.error = None;
        Ok(answered)
    }

    pub fn apply(&mut self, signal: Signal) -> Applied {
        if self.phase != SessionPhase::Streaming {
            return Applied::Ignored;
        }
        self.interrupts.settle();

        match signal {
            Signal::Step(kind) => Applied::Appended(self.push_step(kind)),
            Signal::FinalAnswer { answer } => {
                self.state.final_answer = Some(answer);
                self.finish(SessionPhase::Done)
            }
            Signal::Done => self.finish(SessionPhase::Done),
            Signal::Error { message } => {
                self.state.error = Some(message);
                self.finish(SessionPhase::Error)
            }
            Signal::Interrupt(interrupt) => {
                self.interrupts.pause(interrupt.clone());
                self.state.interrupt = Some(interrupt);
                self.finish(SessionPhase::Interrupted)
            }
        }
    }

    /// Record a transport failure. Returns false when the run had already ended.
    ///
    /// A resumed run that fails before its first event keeps the answered
    /// interrupt, so the decision can be submitted again.
    pub fn fail(&mut self, error: &SessionError) -> bool {
        if self.phase != SessionPhase::Streaming {
            return false;
        }
        let unacknowledged = self.interrupts.take_answered();
        self.state.error = Some(error.to_string());
        self.finish(SessionPhase::Error);
        if let Some(interrupt) = unacknowledged {
            self.interrupts.pause(interrupt);
        }
        true
    }

    fn push_step(&mut self, kind: StepKind) -> StepId {
        let id = self.next_step_id;
        self.next_step_id += 1;
        self.state.steps.push(Step { id, kind });
        id
    }

    fn finish(&mut self, phase: SessionPhase) -> Applied {
        if phase != SessionPhase::Interrupted {
            self.interrupts.discard();
        }
        self.phase = phase;
        self.state.is_streaming = false;
        Applied::Finished(phase)
    }

    fn invalid_resume(&self, reason: InvalidResumeReason) -> SessionError {
        SessionError::InvalidResume {
            thread_id: self.thread_id.clone(),
            reason,
        }
    }
}
