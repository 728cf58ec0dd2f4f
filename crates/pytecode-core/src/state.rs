//! Session lifecycle enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Readiness of the execution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    /// Nothing has been loaded yet.
    #[default]
    Uninitialized,
    /// Runtime or libraries are loading.
    Initializing,
    /// Runs are accepted.
    Ready,
    /// The last initialization attempt failed.
    Failed,
}

impl BackendState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Ready -> Initializing` covers library changes and
    /// `Failed -> Initializing` covers retries.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized | Self::Ready | Self::Failed, Self::Initializing)
                | (Self::Initializing, Self::Ready | Self::Failed)
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

/// Which captured output kind the UI displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Text console.
    #[default]
    Console,
    /// Plots produced by the last run.
    Graphics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use BackendState::{Failed, Initializing, Ready, Uninitialized};

        assert!(Uninitialized.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Ready));
        assert!(Initializing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Initializing));
        assert!(Ready.can_transition_to(Initializing));

        assert!(!Uninitialized.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Uninitialized));
        assert!(!Failed.can_transition_to(Ready));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&BackendState::Initializing).unwrap();
        assert_eq!(json, "\"initializing\"");
        assert_eq!(BackendState::Failed.to_string(), "failed");

        let mode: ViewMode = serde_json::from_str("\"graphics\"").unwrap();
        assert_eq!(mode, ViewMode::Graphics);
        assert_eq!(ViewMode::default(), ViewMode::Console);
    }
}
