//! Console errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

use tankfarm_core::CoreError;

/// Errors raised by configuration, storage, the backend client and exports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    /// Invalid `tankfarm.toml` content or CLI override.
    #[error("invalid config: {0}")]
    InvalidConfig(SmolStr),

    /// Local state file could not be read or written.
    #[error("storage error: {0}")]
    Storage(SmolStr),

    /// Backend unreachable or the connection failed mid-request.
    #[error("transport error: {0}")]
    Transport(SmolStr),

    /// Backend answered with a non-success status or an `error` field.
    #[error("backend error ({status}): {message}")]
    Api { status: u16, message: SmolStr },

    /// Response body is not the expected JSON.
    #[error("decode error: {0}")]
    Decode(SmolStr),

    /// Action blocked by the validation gate; nothing was sent.
    #[error("{0}")]
    Validation(SmolStr),

    /// Export or download could not be completed.
    #[error("export error: {0}")]
    Export(SmolStr),

    /// Embedded web UI could not start.
    #[error("web error: {0}")]
    Web(SmolStr),

    /// Form edit rejected by the model.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ConsoleError {
    /// Message shown to the user next to the failed action.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.to_string(),
            Self::Validation(message) | Self::Export(message) => message.to_string(),
            other => other.to_string(),
        }
    }
}
