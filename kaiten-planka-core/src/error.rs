//! Error taxonomy shared by the orchestrator and both service clients.
//!
//! Stage 0–2 failures are collected into [`Error::Stage`] and abort the run;
//! from Stage 3 onward every error is logged where it happens and the unit of
//! work is abandoned.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing or unusable. Fatal, raised before any call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network failure, timeout or non-2xx status.
    #[error("transport error ({context}): {message}")]
    Transport { context: String, message: String },

    /// The response body did not match the expected shape.
    #[error("decode error ({context}): {message}")]
    Decode { context: String, message: String },

    /// A lookup found nothing, e.g. an email with no destination user.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Local file handling, e.g. the attachment staging directory.
    #[error("i/o error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A spawned unit panicked or was cancelled before reporting.
    #[error("unit of work aborted: {0}")]
    Aborted(String),

    /// Aggregated failures of an all-or-nothing stage.
    #[error("stage '{stage}' failed with {} error(s): {}", errors.len(), summarize(errors))]
    Stage {
        stage: &'static str,
        errors: Vec<Error>,
    },
}

impl Error {
    pub fn transport(context: impl Into<String>, message: impl ToString) -> Self {
        Error::Transport {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(context: impl Into<String>, message: impl ToString) -> Self {
        Error::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            key: key.into(),
        }
    }
}

fn summarize(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
