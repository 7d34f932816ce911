//! Command dispatch.
//!
//! Drives one command through the full cycle: route it and claim the target
//! conversation in one registry call, run the turn through a [`TurnExecutor`],
//! then report the outcome back to the registry. The registry lock is never
//! held while the executor runs.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use murmur_core::PermissionMode;
use tracing::{info, warn};

use crate::error::{DispatchError, TurnError};
use crate::service::SessionService;
use crate::task_kind::{TaskKind, TaskKindDetector};
use crate::types::{RouteAction, RoutingDecision, SessionId, TurnOutcome, TurnRequest};

/// Runs a single conversation turn against an external agent.
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Execute the turn and report the session it ran in.
    async fn execute(&self, request: &TurnRequest) -> Result<TurnOutcome, TurnError>;
}

/// What happened to a dispatched command.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub decision: RoutingDecision,
    pub session_id: SessionId,
    pub task_kind: TaskKind,
    pub output: Option<String>,
}

impl DispatchReport {
    pub fn resumed(&self) -> bool {
        self.decision.is_resume()
    }
}

/// Routes commands and runs their turns.
pub struct Dispatcher {
    service: Arc<SessionService>,
    executor: Arc<dyn TurnExecutor>,
    detector: TaskKindDetector,
    working_directory: PathBuf,
    permission_mode: PermissionMode,
}

impl Dispatcher {
    pub fn new(
        service: Arc<SessionService>,
        executor: Arc<dyn TurnExecutor>,
        working_directory: PathBuf,
        permission_mode: PermissionMode,
    ) -> Self {
        Self {
            service,
            executor,
            detector: TaskKindDetector::new(),
            working_directory,
            permission_mode,
        }
    }

    pub fn service(&self) -> &Arc<SessionService> {
        &self.service
    }

    /// Route `command` and run its turn.
    pub async fn handle(&self, command: &str) -> Result<DispatchReport, DispatchError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(DispatchError::EmptyCommand);
        }

        let decision = self.service.route_and_claim(command);
        let task_kind = self.detector.detect(command, Some(self.permission_mode));
        let mut request = TurnRequest {
            command: command.to_string(),
            resume: None,
            task_kind,
            permission_mode: task_kind.permission_mode(self.permission_mode),
            working_directory: self.working_directory.clone(),
        };

        match decision.target.clone() {
            Some(target) if decision.action == RouteAction::Resume => {
                request.resume = Some(target.clone());
                self.resume(decision, target, request).await
            }
            _ => self.start_new(decision, request).await,
        }
    }

    /// Run a turn on a conversation already claimed by routing.
    async fn resume(
        &self,
        decision: RoutingDecision,
        target: SessionId,
        request: TurnRequest,
    ) -> Result<DispatchReport, DispatchError> {
        info!(
            session_id = %target,
            executor = self.executor.name(),
            task_kind = %request.task_kind,
            "Resuming conversation"
        );

        match self.executor.execute(&request).await {
            Ok(outcome) => {
                if outcome.session_id != target {
                    warn!(
                        session_id = %target,
                        reported = %outcome.session_id,
                        "Agent reported a different session id for a resumed turn"
                    );
                }
                self.service.update_after_turn(&target, &request.command);
                Ok(DispatchReport {
                    decision,
                    session_id: target,
                    task_kind: request.task_kind,
                    output: outcome.output,
                })
            }
            Err(e) => {
                warn!(session_id = %target, error = %e, "Resumed turn failed");
                self.service.mark_errored(&target);
                Err(e.into())
            }
        }
    }

    async fn start_new(
        &self,
        decision: RoutingDecision,
        request: TurnRequest,
    ) -> Result<DispatchReport, DispatchError> {
        info!(
            executor = self.executor.name(),
            task_kind = %request.task_kind,
            "Starting new conversation"
        );

        let outcome = self.executor.execute(&request).await.map_err(|e| {
            warn!(error = %e, "New conversation turn failed");
            e
        })?;

        self.service.register(
            outcome.session_id.clone(),
            &request.command,
            request.task_kind.as_str(),
            &request.working_directory,
        )?;

        Ok(DispatchReport {
            decision,
            session_id: outcome.session_id,
            task_kind: request.task_kind,
            output: outcome.output,
        })
    }
}
