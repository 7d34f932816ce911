//! Domain types shared by the registry, router and dispatcher.

use std::fmt;
use std::path::PathBuf;

use murmur_core::PermissionMode;
use serde::{Deserialize, Serialize};

use crate::task_kind::TaskKind;

// =============================================================================
// Session identity and status
// =============================================================================

/// Identifier issued by the agent for a conversation. Opaque to Murmur.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Conversation lifecycle states.
///
/// Only `Idle` conversations are routing candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// A turn is in flight.
    Active,
    /// Last turn succeeded; the conversation can be resumed.
    Idle,
    /// Last turn failed. Never resumed.
    Errored,
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Idle => write!(f, "idle"),
            ConversationStatus::Errored => write!(f, "errored"),
        }
    }
}

// =============================================================================
// Routing verdicts
// =============================================================================

/// What to do with an incoming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    /// Continue an existing conversation.
    Resume,
    /// Start a fresh conversation.
    New,
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteAction::Resume => write!(f, "resume"),
            RouteAction::New => write!(f, "new"),
        }
    }
}

/// The router's verdict for one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub action: RouteAction,
    /// Set only for `Resume`.
    pub target: Option<SessionId>,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Human-readable rationale, for logs.
    pub reason: String,
}

impl RoutingDecision {
    pub fn resume(target: SessionId, confidence: f64, reason: String) -> Self {
        Self {
            action: RouteAction::Resume,
            target: Some(target),
            confidence: confidence.clamp(0.0, 1.0),
            reason,
        }
    }

    pub fn new_conversation(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            action: RouteAction::New,
            target: None,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }

    pub fn is_resume(&self) -> bool {
        self.action == RouteAction::Resume
    }
}

/// Per-candidate score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub session_id: SessionId,
    /// Jaccard overlap of command and conversation keywords.
    pub keyword: f64,
    /// 1.0 inside the strong window, decaying after it.
    pub recency: f64,
    /// 1.0 when the command carries a continuation phrase.
    pub continuation: f64,
    /// Age in seconds at scoring time.
    pub age_secs: f64,
    /// Whether the strong-continuation floor was applied.
    pub boosted: bool,
    pub total: f64,
}

// =============================================================================
// Turn execution
// =============================================================================

/// Everything an executor needs to run one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub command: String,
    /// Conversation to continue, or `None` to start a new one.
    pub resume: Option<SessionId>,
    pub task_kind: TaskKind,
    pub permission_mode: PermissionMode,
    pub working_directory: PathBuf,
}

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The session the turn ran in. For a resumed turn this is normally the
    /// resumed id.
    pub session_id: SessionId,
    /// Final text produced by the agent, if any.
    pub output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display_and_conversions() {
        let id = SessionId::new("abc-123");
        assert_eq!(id.to_string(), "abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(SessionId::from("abc-123"), id);
        assert_eq!(SessionId::from("abc-123".to_string()), id);
    }

    #[test]
    fn test_session_id_serializes_transparently() {
        let id = SessionId::new("s1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s1\"");
        let back: SessionId = serde_json::from_str("\"s1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConversationStatus::Active.to_string(), "active");
        assert_eq!(ConversationStatus::Idle.to_string(), "idle");
        assert_eq!(ConversationStatus::Errored.to_string(), "errored");
    }

    #[test]
    fn test_decision_constructors_clamp_confidence() {
        let d = RoutingDecision::resume(SessionId::new("s1"), 1.2, "x".into());
        assert!(d.is_resume());
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.target, Some(SessionId::new("s1")));

        let d = RoutingDecision::new_conversation(-0.5, "y");
        assert!(!d.is_resume());
        assert_eq!(d.confidence, 0.0);
        assert!(d.target.is_none());
    }

    #[test]
    fn test_route_action_serde() {
        assert_eq!(
            serde_json::to_string(&RouteAction::Resume).unwrap(),
            "\"resume\""
        );
        assert_eq!(RouteAction::New.to_string(), "new");
    }
}
