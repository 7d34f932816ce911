//! The session routing facade.
//!
//! Pairs one [`ConversationRegistry`] with one [`Router`] and exposes the
//! operations an orchestration layer needs: route a command, then report
//! how the turn went.

use std::path::Path;
use std::sync::Arc;

use murmur_core::{Clock, RegistryConfig, RouterConfig, SystemClock};
use tracing::info;

use crate::error::SessionError;
use crate::registry::{ConversationRecord, ConversationRegistry};
use crate::router::Router;
use crate::types::{RoutingDecision, SessionId};

/// Routes commands to conversations and records turn outcomes.
pub struct SessionService {
    registry: Arc<ConversationRegistry>,
    router: Router,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(registry_config: RegistryConfig, router_config: RouterConfig) -> Self {
        Self::with_clock(registry_config, router_config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        registry_config: RegistryConfig,
        router_config: RouterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: Arc::new(ConversationRegistry::new(registry_config, Arc::clone(&clock))),
            router: Router::new(router_config),
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Decide where a command should go.
    ///
    /// Reads a snapshot of the routable conversations; never blocks on
    /// anything but the registry lock. Nothing is claimed.
    pub fn route(&self, command: &str) -> RoutingDecision {
        let candidates = self.registry.routable_conversations();
        let decision = self.router.route(command, &candidates, self.clock.now());
        log_decision(&decision, candidates.len());
        decision
    }

    /// Route `command` and claim a `Resume` target in the same registry call.
    ///
    /// The target is `Active` on return, so a concurrent command cannot resume
    /// it too and falls back to another conversation or a new one.
    pub fn route_and_claim(&self, command: &str) -> RoutingDecision {
        let mut candidates = 0;
        let decision = self.registry.route_and_claim(|snapshot, now| {
            candidates = snapshot.len();
            self.router.route(command, snapshot, now)
        });
        log_decision(&decision, candidates);
        decision
    }

    pub fn register(
        &self,
        session_id: SessionId,
        command: &str,
        task_kind: &str,
        working_directory: &Path,
    ) -> Result<ConversationRecord, SessionError> {
        self.registry
            .register(session_id, command, task_kind, working_directory)
    }

    pub fn update_after_turn(&self, session_id: &SessionId, command: &str) {
        self.registry.update_after_turn(session_id, command);
    }

    pub fn mark_active(&self, session_id: &SessionId) -> bool {
        self.registry.mark_active(session_id)
    }

    pub fn mark_errored(&self, session_id: &SessionId) {
        self.registry.mark_errored(session_id);
    }
}

fn log_decision(decision: &RoutingDecision, candidates: usize) {
    info!(
        action = %decision.action,
        target = decision.target.as_ref().map(SessionId::as_str).unwrap_or("-"),
        confidence = decision.confidence,
        candidates,
        reason = %decision.reason,
        "Routing decision"
    );
}
