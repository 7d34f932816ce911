//! Error types for session routing and turn dispatch.

use crate::types::SessionId;

/// Errors from the conversation registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session already registered: {0}")]
    DuplicateSession(SessionId),
    #[error("Registry lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Errors from running a turn through an external agent.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Failed to start agent: {0}")]
    Spawn(String),
    #[error("Agent exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("Agent output did not include a session id")]
    MissingSessionId,
    #[error("Turn timed out after {0} seconds")]
    Timeout(u64),
    #[error("Malformed agent output: {0}")]
    Protocol(String),
}

/// Errors from dispatching a command.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Command cannot be empty")]
    EmptyCommand,
    #[error("Turn failed: {0}")]
    Turn(#[from] TurnError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::DuplicateSession(SessionId::new("s1"));
        assert_eq!(err.to_string(), "Session already registered: s1");

        let err = SessionError::LockPoisoned("boom".into());
        assert_eq!(err.to_string(), "Registry lock poisoned: boom");
    }

    #[test]
    fn test_turn_error_display() {
        let err = TurnError::Failed {
            code: Some(2),
            stderr: "bad flag".into(),
        };
        assert_eq!(err.to_string(), "Agent exited with status Some(2): bad flag");

        assert_eq!(
            TurnError::Timeout(600).to_string(),
            "Turn timed out after 600 seconds"
        );
        assert_eq!(
            TurnError::MissingSessionId.to_string(),
            "Agent output did not include a session id"
        );
    }

    #[test]
    fn test_dispatch_error_from_turn_error() {
        let err: DispatchError = TurnError::Spawn("not found".into()).into();
        assert!(matches!(err, DispatchError::Turn(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_dispatch_error_from_session_error() {
        let err: DispatchError = SessionError::DuplicateSession(SessionId::new("s9")).into();
        assert!(matches!(err, DispatchError::Session(_)));
        assert!(err.to_string().contains("s9"));
    }
}
