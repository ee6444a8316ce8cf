//! Error types for the state observer.
//!
//! Two families live here:
//!
//! - [`ObserverError`] is returned synchronously to callers of the observer
//!   API (wrong payload type, bad poll interval, second start,
//!   stopped loop).
//! - [`StateError`] travels inside a [`StateValue`](crate::StateValue) on the
//!   notification stream. It is the only error shape that crosses that
//!   boundary; accessor `anyhow` errors are flattened into it.
//!
//! Deduplication compares [`StateError`]s by their `Display` output, so a
//! read failure and a write failure with the same text count as the same
//! error state.

use std::num::ParseIntError;

use thiserror::Error;

/// Errors returned directly to callers of [`StateObserver`](crate::StateObserver).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    /// A type-erased write request carried a payload of the wrong type.
    #[error("incorrect value type for observer: need {expected}; got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// `start` was called on an observer whose loop is already running.
    #[error("observer was already started")]
    AlreadyStarted,

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    /// The poll interval reaches past what the clock can represent.
    #[error("poll interval {0:?} is too large to schedule")]
    PollIntervalTooLarge(std::time::Duration),

    /// The reconciliation loop has terminated.
    #[error("observer is stopped")]
    Stopped,
}

/// Error half of a [`StateValue`](crate::StateValue).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The accessor failed to read the remote state.
    #[error("{0}")]
    Fetch(String),

    /// The accessor failed to apply a requested value.
    #[error("{0}")]
    Write(String),

    /// The accessor panicked; the panic was contained by the loop.
    #[error("observer was panicked: {0}")]
    Panicked(String),
}

impl StateError {
    pub(crate) fn fetch(error: &anyhow::Error) -> Self {
        StateError::Fetch(format!("{:#}", error))
    }

    pub(crate) fn write(error: &anyhow::Error) -> Self {
        StateError::Write(format!("{:#}", error))
    }

    /// Whether this error came from a contained panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, StateError::Panicked(_))
    }
}

/// Errors loading [`ObserverConfig`](crate::ObserverConfig) from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number of milliseconds: {source}")]
    InvalidInterval {
        var: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("{var} must be greater than zero")]
    ZeroInterval { var: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_panicked_display_carries_detail() {
        let err = StateError::Panicked("bad slice".to_string());
        assert_eq!(err.to_string(), "observer was panicked: bad slice");
        assert!(err.is_panic());
    }

    #[test]
    fn test_fetch_flattens_anyhow_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("reading thermostat")
            .unwrap_err();
        assert_eq!(
            StateError::fetch(&err).to_string(),
            "reading thermostat: connection refused"
        );
    }

    #[test]
    fn test_read_and_write_share_textual_identity() {
        let read = StateError::Fetch("offline".to_string());
        let write = StateError::Write("offline".to_string());
        assert_eq!(read.to_string(), write.to_string());
        assert_ne!(read, write);
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let err = ObserverError::TypeMismatch {
            expected: "alloc::vec::Vec<u8>",
            actual: "i32",
        };
        assert_eq!(
            err.to_string(),
            "incorrect value type for observer: need alloc::vec::Vec<u8>; got i32"
        );
    }
}
