use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::callback::ConnectorCallback;
use crate::error::HarnessResult;

/// Lifecycle state of an embedded engine.
///
/// Moves strictly forward: `NotStarted -> Starting -> Running -> Stopping -> Stopped`.
/// `Running` may be skipped when the connector never starts, `Stopping` is only skipped when
/// the task ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EngineState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl EngineState {
    /// Returns `true` once the engine has settled, i.e. it is no longer starting up.
    pub fn is_settled(self) -> bool {
        !matches!(self, EngineState::NotStarted | EngineState::Starting)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::NotStarted => write!(f, "not_started"),
            EngineState::Starting => write!(f, "starting"),
            EngineState::Running => write!(f, "running"),
            EngineState::Stopping => write!(f, "stopping"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Built-in callback that tracks the engine state from lifecycle notifications.
///
/// The state is held in a [`watch`] channel so it can be read from any thread and awaited
/// without polling. The tracker is always the first callback an engine notifies.
#[derive(Debug, Clone)]
pub struct EngineStateTracker {
    state_tx: Arc<watch::Sender<EngineState>>,
}

impl EngineStateTracker {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(EngineState::NotStarted);

        Self {
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// `NotStarted -> Starting`. Returns `false` if the engine already left `NotStarted`.
    pub fn mark_starting(&self) -> bool {
        self.transition(|state| match state {
            EngineState::NotStarted => Some(EngineState::Starting),
            _ => None,
        })
    }

    /// `NotStarted | Starting | Running -> Stopping`. Returns `false` if the engine was
    /// already stopping or stopped.
    pub fn mark_stopping(&self) -> bool {
        self.transition(|state| match state {
            EngineState::NotStarted | EngineState::Starting | EngineState::Running => {
                Some(EngineState::Stopping)
            }
            _ => None,
        })
    }

    /// Moves to `Stopped` from any state.
    pub fn mark_stopped(&self) -> bool {
        self.transition(|state| match state {
            EngineState::Stopped => None,
            _ => Some(EngineState::Stopped),
        })
    }

    fn transition(&self, next: impl FnOnce(EngineState) -> Option<EngineState>) -> bool {
        self.state_tx.send_if_modified(|state| match next(*state) {
            Some(new_state) => {
                *state = new_state;
                true
            }
            None => false,
        })
    }
}

impl Default for EngineStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorCallback for EngineStateTracker {
    fn connector_started(&self) -> HarnessResult<()> {
        // A close requested while the connector was starting keeps the engine stopping.
        self.transition(|state| match state {
            EngineState::Starting => Some(EngineState::Running),
            _ => None,
        });

        Ok(())
    }

    fn connector_stopped(&self) -> HarnessResult<()> {
        self.mark_stopped();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_lifecycle() {
        let tracker = EngineStateTracker::new();
        assert_eq!(tracker.state(), EngineState::NotStarted);

        assert!(tracker.mark_starting());
        assert_eq!(tracker.state(), EngineState::Starting);

        tracker.connector_started().unwrap();
        assert_eq!(tracker.state(), EngineState::Running);

        assert!(tracker.mark_stopping());
        assert_eq!(tracker.state(), EngineState::Stopping);

        tracker.connector_stopped().unwrap();
        assert_eq!(tracker.state(), EngineState::Stopped);
    }

    #[test]
    fn started_notification_does_not_resurrect_a_stopping_engine() {
        let tracker = EngineStateTracker::new();
        tracker.mark_starting();
        tracker.mark_stopping();

        tracker.connector_started().unwrap();

        assert_eq!(tracker.state(), EngineState::Stopping);
    }

    #[test]
    fn transitions_only_move_forward() {
        let tracker = EngineStateTracker::new();
        tracker.mark_starting();

        assert!(!tracker.mark_starting());

        tracker.mark_stopped();
        assert!(!tracker.mark_stopping());
        assert!(!tracker.mark_stopped());
        assert_eq!(tracker.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let tracker = EngineStateTracker::new();
        let mut state_rx = tracker.subscribe();

        tracker.mark_starting();
        tracker.connector_started().unwrap();

        let state = *state_rx
            .wait_for(|state| *state == EngineState::Running)
            .await
            .unwrap();
        assert_eq!(state, EngineState::Running);
    }

    #[test]
    fn settled_states() {
        assert!(!EngineState::NotStarted.is_settled());
        assert!(!EngineState::Starting.is_settled());
        assert!(EngineState::Running.is_settled());
        assert!(EngineState::Stopping.is_settled());
        assert!(EngineState::Stopped.is_settled());
        assert_eq!(EngineState::Running.to_string(), "running");
    }
}
