use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting submissions.
    Running,
    /// No new submissions; in-flight tasks may still be running.
    Shutdown,
    /// Shut down and every submitted task has finished.
    Terminated,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(PoolState, PoolState),
}

pub struct StateMachine {
    pub state: PoolState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: PoolState::Running }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: PoolState) -> bool {
        matches!(
            (self.state, to),
            (PoolState::Running, PoolState::Shutdown)
                | (PoolState::Running, PoolState::Terminated)
                | (PoolState::Shutdown, PoolState::Terminated)
        )
    }

    pub fn transition(&mut self, to: PoolState) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            tracing::debug!("Pool state transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.state == PoolState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state, PoolState::Running);
        assert!(sm.is_accepting());
        assert!(sm.transition(PoolState::Shutdown).is_ok());
        assert!(!sm.is_accepting());
        assert!(sm.transition(PoolState::Terminated).is_ok());
    }

    #[test]
    fn invalid_transition() {
        let mut sm = StateMachine::new();
        sm.transition(PoolState::Terminated).unwrap();
        // a terminated pool never runs again
        assert!(sm.transition(PoolState::Running).is_err());
        assert!(sm.transition(PoolState::Shutdown).is_err());
    }
}
