//! Conversation session routing for murmur.
//!
//! Keeps a bounded registry of agent conversations, decides whether each
//! incoming command resumes one of them or starts a new one, and drives
//! turns through a pluggable executor.

pub mod continuation;
pub mod dispatcher;
pub mod error;
pub mod keywords;
pub mod registry;
pub mod router;
pub mod service;
pub mod task_kind;
pub mod types;

pub use continuation::ContinuationDetector;
pub use dispatcher::{DispatchReport, Dispatcher, TurnExecutor};
pub use error::{DispatchError, SessionError, TurnError};
pub use keywords::extract_keywords;
pub use registry::{ConversationRecord, ConversationRegistry};
pub use router::Router;
pub use service::SessionService;
pub use task_kind::{TaskKind, TaskKindDetector};
pub use types::{
    CandidateScore, ConversationStatus, RouteAction, RoutingDecision, SessionId, TurnOutcome,
    TurnRequest,
};
