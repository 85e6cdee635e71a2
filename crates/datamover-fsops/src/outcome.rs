//! Tagged result returned by every path handler.

use std::fmt;

const TERMINATED: &str = "terminated";
const INTERRUPTED: &str = "interrupted";

/// Result of handing one path to a [`PathHandler`](crate::PathHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The path was moved.
    Ok,
    /// The attempt failed but may succeed later.
    RetriableError(String),
    /// The attempt failed in a way retrying will not fix.
    FatalError(String),
}

impl CopyOutcome {
    /// Build a retriable outcome.
    #[must_use]
    pub fn retriable(message: impl Into<String>) -> Self {
        Self::RetriableError(message.into())
    }

    /// Build a fatal outcome.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::FatalError(message.into())
    }

    /// Outcome of a copy cancelled through `terminate()`.
    #[must_use]
    pub fn terminated() -> Self {
        Self::retriable(TERMINATED)
    }

    /// Outcome of a copy whose wait was interrupted.
    #[must_use]
    pub fn interrupted() -> Self {
        Self::retriable(INTERRUPTED)
    }

    /// Whether the handler reported success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Whether a later attempt may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::RetriableError(_))
    }

    /// Whether the outcome records a copy cancelled through `terminate()`.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::RetriableError(message) if message == TERMINATED)
    }

    /// Failure detail, absent for [`CopyOutcome::Ok`].
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Ok => None,
            Self::RetriableError(message) | Self::FatalError(message) => Some(message),
        }
    }

    /// Stable label used for metrics and events.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::RetriableError(_) => "retriable_error",
            Self::FatalError(_) => "fatal_error",
        }
    }
}

impl fmt::Display for CopyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {message}", self.label()),
            None => f.write_str(self.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_messages() {
        assert_eq!(CopyOutcome::Ok.label(), "ok");
        assert!(CopyOutcome::Ok.message().is_none());
        assert_eq!(CopyOutcome::Ok.to_string(), "ok");

        let fatal = CopyOutcome::fatal("spawn failed");
        assert_eq!(fatal.label(), "fatal_error");
        assert_eq!(fatal.message(), Some("spawn failed"));
        assert!(!fatal.is_retriable());
        assert_eq!(fatal.to_string(), "fatal_error: spawn failed");
    }

    #[test]
    fn cancellation_outcomes_are_retriable() {
        assert!(CopyOutcome::terminated().is_retriable());
        assert!(CopyOutcome::terminated().is_terminated());
        assert!(CopyOutcome::interrupted().is_retriable());
        assert!(!CopyOutcome::interrupted().is_terminated());
    }
}
