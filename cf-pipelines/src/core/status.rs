//! Invocation status of a single function call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a function invocation stands within a run.
///
/// Transitions are `Pending -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Returned normally and passed the after hook.
    Completed,
    /// Raised a fault, or its after hook did.
    Failed,
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl InvocationStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns whether moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Completed | Self::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(InvocationStatus::Pending.to_string(), "pending");
        assert_eq!(InvocationStatus::Completed.to_string(), "completed");
        assert_eq!(InvocationStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_status_transitions() {
        use InvocationStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(InvocationStatus::Completed.is_terminal());
        assert!(InvocationStatus::Failed.is_terminal());
        assert!(!InvocationStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&InvocationStatus::Running).unwrap();
        assert_eq!(json, r#""running""#);
    }
}
