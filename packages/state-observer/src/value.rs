//! State values published by the observer.
//!
//! A [`StateValue`] is either a known good state or a known failure state,
//! never both. When an error is present the payload has been cleared.

use std::fmt::Debug;

use crate::error::StateError;

/// Marker trait for types an observer can track.
///
/// Equality is full structural equality: the observer never diffs fields.
pub trait ObservedState: Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Debug + Send + Sync + 'static> ObservedState for T {}

/// Snapshot of the observed object's state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateValue<T> {
    value: Option<T>,
    error: Option<StateError>,
}

impl<T> StateValue<T> {
    /// A known good state.
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    /// A known failure state. The payload is empty.
    pub fn failed(error: StateError) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    /// The payload, absent when the state is a failure.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&StateError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Returns true if `candidate` equals the cached payload.
    ///
    /// A failure state holds no payload and so never matches.
    pub(crate) fn holds(&self, candidate: &T) -> bool
    where
        T: PartialEq,
    {
        self.value.as_ref() == Some(candidate)
    }

    /// Returns true if `error` has the same textual identity as the cached error.
    pub(crate) fn has_same_error(&self, error: &StateError) -> bool {
        self.error
            .as_ref()
            .is_some_and(|current| current.to_string() == error.to_string())
    }

    /// Convert into a `Result`, consuming the snapshot.
    pub fn into_result(self) -> Result<T, StateError> {
        match (self.value, self.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => Err(StateError::Fetch("state holds no value".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_state_clears_value() {
        let state: StateValue<Vec<u8>> = StateValue::failed(StateError::Fetch("down".into()));
        assert!(state.value().is_none());
        assert!(!state.is_ok());
        assert!(!state.holds(&Vec::new()));
    }

    #[test]
    fn test_holds_compares_structurally() {
        let state = StateValue::ok(vec![1u8, 2, 3]);
        assert!(state.holds(&vec![1, 2, 3]));
        assert!(!state.holds(&vec![1, 2]));
    }

    #[test]
    fn test_error_identity_is_textual() {
        let state: StateValue<u32> = StateValue::failed(StateError::Fetch("unreachable".into()));
        assert!(state.has_same_error(&StateError::Fetch("unreachable".into())));
        assert!(!state.has_same_error(&StateError::Fetch("timeout".into())));
        assert!(!StateValue::ok(1u32).has_same_error(&StateError::Fetch("unreachable".into())));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(StateValue::ok(7u32).into_result().ok(), Some(7));
        let failed: StateValue<u32> = StateValue::failed(StateError::Write("rejected".into()));
        assert_eq!(
            failed.into_result().err(),
            Some(StateError::Write("rejected".into()))
        );
    }
}
