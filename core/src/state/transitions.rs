use thiserror::Error;

use super::types::ControlState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: ControlState, to: ControlState },
}

/// The controller's transition table.
pub struct StateTransition;

impl StateTransition {
    pub fn validate(from: ControlState, to: ControlState) -> Result<(), TransitionError> {
        use ControlState::*;

        let is_valid = matches!(
            (from, to),
            (Idle, Validating)
                | (Validating, Ready)
                // revalidate
                | (Ready, Validating)
                | (Ready, Running)
                | (Running, Success)
                | (Running, Fail)
                | (Success, Ready)
                | (Fail, Ready)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// States the controller leaves on its own, without operator input.
    pub fn next_phase(current: ControlState) -> Option<ControlState> {
        match current {
            ControlState::Idle => Some(ControlState::Validating),
            ControlState::Validating => Some(ControlState::Ready),
            ControlState::Success | ControlState::Fail => Some(ControlState::Ready),
            ControlState::Ready | ControlState::Running => None,
        }
    }

    /// End of a run; the controller passes through on the way back to READY.
    pub fn is_terminal(state: ControlState) -> bool {
        matches!(state, ControlState::Success | ControlState::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControlState::*;

    #[test]
    fn test_valid_transitions() {
        for (from, to) in [
            (Idle, Validating),
            (Validating, Ready),
            (Ready, Running),
            (Running, Success),
            (Running, Fail),
            (Success, Ready),
            (Fail, Ready),
            (Ready, Validating),
        ] {
            assert!(StateTransition::validate(from, to).is_ok(), "{from} -> {to}");
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(
            StateTransition::validate(Running, Validating),
            Err(TransitionError::InvalidTransition {
                from: Running,
                to: Validating
            })
        );
        assert!(StateTransition::validate(Idle, Running).is_err());
        assert!(StateTransition::validate(Running, Running).is_err());
        assert!(StateTransition::validate(Success, Running).is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(StateTransition::is_terminal(Success));
        assert!(StateTransition::is_terminal(Fail));
        assert!(!StateTransition::is_terminal(Running));
    }

    #[test]
    fn test_next_phase() {
        assert_eq!(StateTransition::next_phase(Idle), Some(Validating));
        assert_eq!(StateTransition::next_phase(Fail), Some(Ready));
        assert_eq!(StateTransition::next_phase(Running), None);
    }
}
