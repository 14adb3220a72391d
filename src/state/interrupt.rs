use crate::error::InvalidResumeReason;
use crate::types::{HumanInterrupt, HumanResponse, ResponseKind};

/// Holds the single pending interrupt of a session and gates responses to it.
///
/// An answered interrupt is remembered until the resumed run shows it reached
/// the backend, so a resume whose stream never produced anything can be sent
/// again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterruptCoordinator {
    pending: Option<HumanInterrupt>,
    answered: Option<HumanInterrupt>,
}

impl InterruptCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&HumanInterrupt> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a pause. A newer interrupt replaces any earlier one.
    pub fn pause(&mut self, interrupt: HumanInterrupt) {
        self.pending = Some(interrupt);
    }

    /// Consume the pending interrupt once `response` is accepted for it.
    pub fn take_for(&mut self, response: &HumanResponse) -> Result<HumanInterrupt, InvalidResumeReason> {
        let interrupt = self.pending.as_ref().ok_or(InvalidResumeReason::NoSession)?;
        Self::validate(interrupt, response)?;
        let interrupt = self.pending.take().ok_or(InvalidResumeReason::NoSession)?;
        self.answered = Some(interrupt.clone());
        Ok(interrupt)
    }

    /// The resumed run produced output; the answer is final.
    pub fn settle(&mut self) {
        self.answered = None;
    }

    /// Answered interrupt whose resume has not been acknowledged yet.
    pub fn take_answered(&mut self) -> Option<HumanInterrupt> {
        self.answered.take()
    }

    pub fn discard(&mut self) {
        self.pending = None;
        self.answered = None;
    }

    /// Whether controls for `kind` should be enabled at all.
    pub fn can_submit(interrupt: &HumanInterrupt, kind: ResponseKind) -> bool {
        interrupt.config.allows(kind)
    }

    pub fn validate(
        interrupt: &HumanInterrupt,
        response: &HumanResponse,
    ) -> Result<(), InvalidResumeReason> {
        let kind = response.kind();
        if !Self::can_submit(interrupt, kind) {
            return Err(InvalidResumeReason::Disallowed(kind));
        }
        if let HumanResponse::Edit { action, .. } = response {
            if action != interrupt.action() {
                return Err(InvalidResumeReason::ActionMismatch {
                    pending: interrupt.action().to_string(),
                    submitted: action.clone(),
                });
            }
        }
        Ok(())
    }
}
