use crate::model::TaskKind;
use thiserror::Error;

/// Failures surfaced to the user by a task page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Missing or malformed input, caught before anything is submitted.
    #[error("{0}")]
    Validation(String),
    /// Anything raised while loading or running a capability.
    #[error("{0}")]
    Execution(String),
}

impl TaskError {
    pub fn is_validation(&self) -> bool {
        matches!(self, TaskError::Validation(_))
    }
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{capability} cannot process {got} input")]
    InputMismatch {
        capability: TaskKind,
        got: &'static str,
    },
    #[error("inference endpoint returned {status}: {message}")]
    Endpoint { status: u16, message: String },
    #[error("unexpected response from inference endpoint: {0}")]
    Decode(String),
}
