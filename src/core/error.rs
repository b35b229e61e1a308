use thiserror::Error;

use super::sweep::ParameterName;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("invalid input: {field} {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("parameter `{0}` cannot be specified both as fixed and as swept")]
    ParameterConflict(ParameterName),

    #[error("parameter `{0}` must be specified either as fixed or as swept")]
    MissingParameter(ParameterName),

    #[error("swept range for `{name}` is empty (start {start}, stop {stop}, step {step})")]
    EmptyRange {
        name: ParameterName,
        start: f64,
        stop: f64,
        step: f64,
    },
}

impl SimulationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SimulationError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

pub type SimulationResult<T> = Result<T, SimulationError>;
