use crate::CoreError;
use winvora_store::EnvState;

/// Persisted state transitions a manager operation may perform.
pub fn validate_transition(from: EnvState, to: EnvState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (EnvState::Creating | EnvState::Configuring, EnvState::Ready)
            | (EnvState::Ready, EnvState::Configuring)
            // Deleting -> Deleting resumes an interrupted delete.
            | (
                EnvState::Creating | EnvState::Ready | EnvState::Deleting,
                EnvState::Deleting
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(EnvState::Creating, EnvState::Ready).is_ok());
        assert!(validate_transition(EnvState::Ready, EnvState::Configuring).is_ok());
        assert!(validate_transition(EnvState::Configuring, EnvState::Ready).is_ok());
        assert!(validate_transition(EnvState::Ready, EnvState::Deleting).is_ok());
        assert!(validate_transition(EnvState::Deleting, EnvState::Deleting).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(EnvState::Configuring, EnvState::Deleting).is_err());
        assert!(validate_transition(EnvState::Configuring, EnvState::Configuring).is_err());
        assert!(validate_transition(EnvState::Deleting, EnvState::Ready).is_err());
        assert!(validate_transition(EnvState::Deleting, EnvState::Configuring).is_err());
        assert!(validate_transition(EnvState::Ready, EnvState::Creating).is_err());
    }

    #[test]
    fn error_names_both_states() {
        let err = validate_transition(EnvState::Configuring, EnvState::Deleting).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("configuring"));
        assert!(msg.contains("deleting"));
    }
}
