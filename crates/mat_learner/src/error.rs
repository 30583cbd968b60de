//! Error kinds per the error-handling design: transport faults are retryable
//! at the call site, everything else is fatal for the session.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearnerError {
    /// The Teacher call failed or returned malformed data. Retried with
    /// backoff up to a fixed budget by the Learner Loop; surfaced once that
    /// budget is exhausted.
    #[error("transport error contacting MAT: {0}")]
    Transport(String),

    /// The Teacher response shape was well-formed JSON but inconsistent with
    /// the request (e.g. a batch reply of the wrong length). Fatal for the
    /// session.
    #[error("protocol error in MAT response: {0}")]
    Protocol(String),

    /// A table mutation would contradict an already-cached value, or a cell
    /// was read before it was filled. Indicates a learner bug.
    #[error("observation table invariant violated: {0}")]
    InvariantViolation(String),

    /// The human teacher gave an unparseable response. The caller should
    /// reprompt rather than treat this as learning progress.
    #[error("could not parse operator input: {0}")]
    UserInput(String),

    /// Missing or malformed settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The caller's `should_continue` predicate returned `false` at a phase
    /// boundary or after a Teacher call. Not a fault; the table is left in a
    /// consistent, resumable state wherever this is raised.
    #[error("learning session cancelled by caller")]
    Cancelled,
}

impl LearnerError {
    pub fn is_transport(&self) -> bool {
        matches!(self, LearnerError::Transport(_))
    }
}
