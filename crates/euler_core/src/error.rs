//! Error types shared by the equation engine and the integrator.

use crate::integrator::Trajectory;
use thiserror::Error;

/// The equation text could not be turned into a callable derivative.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at position {position})")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the equation text.
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// A compiled equation failed for a particular `(x, y)`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("math domain error: {function}({argument})")]
    Domain {
        function: &'static str,
        argument: f64,
    },
    #[error("{operation} produced a non-finite value")]
    NonFinite { operation: &'static str },
    #[error("malformed bytecode: stack underflow")]
    StackUnderflow,
    #[error("malformed bytecode: no variable at index {0}")]
    MissingVariable(usize),
}

/// Integration parameters rejected before any evaluation takes place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f64 },
    #[error("Step size h must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("Step size h = {h} is too small to advance x near {x}")]
    StepTooSmall { h: f64, x: f64 },
    #[error("Integration needs about {required} steps, above the limit of {limit}")]
    TooManySteps { required: f64, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(#[from] ParameterError),
    /// Evaluation failed mid-run. `trajectory` holds every point computed
    /// before the failure and always contains at least the initial point.
    #[error("Error during computation: {error}")]
    Interrupted {
        trajectory: Trajectory,
        #[source]
        error: EvaluationError,
    },
}

impl IntegrationError {
    /// The points computed before the run stopped, if it got that far.
    pub fn partial_trajectory(&self) -> Option<&Trajectory> {
        match self {
            IntegrationError::InvalidParameters(_) => None,
            IntegrationError::Interrupted { trajectory, .. } => Some(trajectory),
        }
    }
}
