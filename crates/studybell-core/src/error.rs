//! Studybell error taxonomy.
//!
//! Every request-scoped and dispatcher-scoped failure is one of these
//! variants; none is fatal to the process. The gateway maps `kind()` to an
//! HTTP status code, the dispatcher records it in the run summary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StudybellError>;

#[derive(Debug, Error)]
pub enum StudybellError {
    /// Malformed or out-of-range request field. Message names the field.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Block would start less than the required lead time from now.
    #[error("too soon: {0}")]
    TooSoon(String),

    /// Requested interval overlaps an existing block of the same owner.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Delete of an absent block, or of one owned by someone else —
    /// deliberately indistinguishable.
    #[error("not found: {0}")]
    NotFound(String),

    /// Mail transport failure: auth, connection, provider rejection.
    #[error("send failed: {0}")]
    Send(String),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),
}

impl StudybellError {
    /// Stable machine-readable kind, surfaced in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::TooSoon(_) => "too_soon",
            Self::Conflict(_) => "conflict",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::NotFound(_) => "not_found",
            Self::Send(_) => "send_error",
            Self::Store(_) => "store_error",
            Self::Config(_) => "config_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable() {
        assert_eq!(StudybellError::TooSoon("x".into()).kind(), "too_soon");
        assert_eq!(StudybellError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(StudybellError::Send("x".into()).kind(), "send_error");
    }

    #[test]
    fn display_includes_message() {
        let e = StudybellError::InvalidInput("subject must not be empty".into());
        assert_eq!(e.to_string(), "invalid input: subject must not be empty");
    }
}
