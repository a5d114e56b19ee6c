//! Error types for the reactive core.
//!
//! Only lifecycle bugs (touching a disposed primitive) and environment
//! problems (no async runtime) are returned to callers. Failures inside
//! effect bodies and cleanups are recovered locally and only logged; the
//! `EffectFailed` and `CleanupFailed` variants exist so those log lines carry
//! a structured error value.

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// The kind of reactive primitive an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveKind {
    Signal,
    Effect,
    Computed,
}

impl fmt::Display for ReactiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactiveKind::Signal => f.write_str("signal"),
            ReactiveKind::Effect => f.write_str("effect"),
            ReactiveKind::Computed => f.write_str("computed"),
        }
    }
}

/// Errors produced by the reactive core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// An operation was attempted on a disposed signal or effect.
    #[error("{kind} {} has been disposed", label(.name))]
    Disposed {
        kind: ReactiveKind,
        name: Option<String>,
    },

    /// An effect body (or computed producer) panicked or returned an error.
    #[error("effect {} failed: {reason}", label(.name))]
    EffectFailed {
        name: Option<String>,
        reason: String,
    },

    /// A cleanup callback panicked while being superseded or disposed.
    #[error("cleanup of effect {} failed: {reason}", label(.name))]
    CleanupFailed {
        name: Option<String>,
        reason: String,
    },

    /// An asynchronous effect was created outside of a Tokio runtime.
    #[error("asynchronous effects require a running Tokio runtime")]
    NoRuntime,
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

impl ReactiveError {
    pub(crate) fn disposed(kind: ReactiveKind, name: Option<&str>) -> Self {
        ReactiveError::Disposed {
            kind,
            name: name.map(str::to_owned),
        }
    }

    /// Whether this is a disposed-access error.
    pub fn is_disposed(&self) -> bool {
        matches!(self, ReactiveError::Disposed { .. })
    }
}

fn label(name: &Option<String>) -> &str {
    name.as_deref().unwrap_or("<anonymous>")
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposed_error_names_the_primitive() {
        let err = ReactiveError::disposed(ReactiveKind::Signal, Some("count"));
        assert_eq!(err.to_string(), "signal count has been disposed");
        assert!(err.is_disposed());

        let anonymous = ReactiveError::disposed(ReactiveKind::Effect, None);
        assert_eq!(anonymous.to_string(), "effect <anonymous> has been disposed");
    }

    #[test]
    fn panic_message_handles_both_string_types() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "panic with non-string payload");
    }
}
