//! Core errors for form handling and tank assignment.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised by the form model and the assignment engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Filled + empty tanks exceed the configured tank count.
    #[error("over-allocation: {filled} filled + {empty} empty exceeds {total} tanks")]
    OverAllocated { total: u32, filled: u32, empty: u32 },

    /// Tank id is zero or not a number.
    #[error("invalid tank id '{0}'")]
    InvalidTankId(SmolStr),

    /// Tank id is valid but no such tank is currently rendered.
    #[error("tank {0} is not rendered")]
    UnknownTank(u32),

    /// Operation only applies to idle tanks.
    #[error("tank {0} is not idle")]
    NotIdle(u32),

    /// Idle crude line index out of range.
    #[error("tank {tank} has no crude line {index}")]
    UnknownCrudeLine { tank: u32, index: usize },

    /// Field value could not be read as a number.
    #[error("invalid number for '{field}': '{value}'")]
    InvalidNumber { field: SmolStr, value: SmolStr },

    /// Date/time field could not be parsed.
    #[error("invalid date/time '{0}'")]
    InvalidDateTime(SmolStr),
}
