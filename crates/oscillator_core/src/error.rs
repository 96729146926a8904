use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type OscillatorResult<T> = Result<T, OscillatorError>;

/// Failures surfaced to the caller of a solve or a query.
///
/// Every variant is terminal for the request that produced it: nothing is
/// retried and no partial result is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OscillatorError {
    #[error("Invalid input: {what}")]
    InvalidInput { what: String },

    #[error("Invalid forcing expression: {reason}")]
    InvalidForcingExpression { reason: String },

    #[error("No closed-form solution: {reason}")]
    UnsolvableEquation { reason: String },

    #[error("Evaluation domain error: {reason}")]
    EvaluationDomain { reason: String },
}

/// Serializable discriminant of [`OscillatorError`], for UIs that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    InvalidForcingExpression,
    UnsolvableEquation,
    EvaluationDomainError,
}

impl OscillatorError {
    pub fn invalid_input(what: impl Into<String>) -> Self {
        Self::InvalidInput { what: what.into() }
    }

    pub fn invalid_forcing(reason: impl Into<String>) -> Self {
        Self::InvalidForcingExpression {
            reason: reason.into(),
        }
    }

    pub fn unsolvable(reason: impl Into<String>) -> Self {
        Self::UnsolvableEquation {
            reason: reason.into(),
        }
    }

    pub fn evaluation_domain(reason: impl Into<String>) -> Self {
        Self::EvaluationDomain {
            reason: reason.into(),
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidInput { what } => what,
            Self::InvalidForcingExpression { reason }
            | Self::UnsolvableEquation { reason }
            | Self::EvaluationDomain { reason } => reason,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::InvalidForcingExpression { .. } => ErrorKind::InvalidForcingExpression,
            Self::UnsolvableEquation { .. } => ErrorKind::UnsolvableEquation,
            Self::EvaluationDomain { .. } => ErrorKind::EvaluationDomainError,
        }
    }
}

/// Rejects NaN and infinities for a named input.
pub fn ensure_finite(value: f64, what: &str) -> OscillatorResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(OscillatorError::invalid_input(format!(
            "{what} must be finite (got {value})"
        )))
    }
}
