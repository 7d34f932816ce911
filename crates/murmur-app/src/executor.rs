//! Turn executors for the murmur binary.
//!
//! [`AgentCliExecutor`] runs the agent CLI once per turn in print mode and
//! reads the session id back from its JSON result. [`DryRunExecutor`] skips
//! the agent entirely.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use murmur_core::AgentConfig;
use murmur_session::{SessionId, TaskKind, TurnError, TurnExecutor, TurnOutcome, TurnRequest};
use serde::Deserialize;
use tokio::process::Command;

/// Appended to the prompt of every plan turn.
const PLANNING_SUFFIX: &str = "When creating the plan if you are defining classes, include the \
     pseudo code or example implementation. DO NOT ask any follow up questions.";

/// Stderr kept in error messages.
const MAX_STDERR_CHARS: usize = 2000;

/// Final JSON object printed by the agent in `--output-format json` mode.
#[derive(Debug, Deserialize)]
struct AgentResult {
    session_id: Option<String>,
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
}

/// Runs turns through the agent's command-line interface.
pub struct AgentCliExecutor {
    config: AgentConfig,
}

impl AgentCliExecutor {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Arguments for one invocation, after `extra_args`.
    fn turn_args(&self, request: &TurnRequest) -> Vec<String> {
        let prompt = match request.task_kind {
            TaskKind::Plan => format!("{}\n\n{}", request.command, PLANNING_SUFFIX),
            TaskKind::Edit => request.command.clone(),
        };

        let mut args = vec![
            "-p".to_string(),
            prompt,
            "--output-format".to_string(),
            "json".to_string(),
            "--permission-mode".to_string(),
            request.permission_mode.as_str().to_string(),
        ];
        if !self.config.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.config.allowed_tools.join(","));
        }
        if let Some(ref session_id) = request.resume {
            args.push("--resume".to_string());
            args.push(session_id.to_string());
        }
        args
    }
}

#[async_trait]
impl TurnExecutor for AgentCliExecutor {
    fn name(&self) -> &'static str {
        "agent-cli"
    }

    async fn execute(&self, request: &TurnRequest) -> Result<TurnOutcome, TurnError> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.extra_args)
            .args(self.turn_args(request))
            .current_dir(&request.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| TurnError::Spawn(format!("{}: {}", self.config.program, e)))?;
        tracing::debug!(
            program = %self.config.program,
            resume = request.resume.is_some(),
            permission_mode = %request.permission_mode,
            "Agent process started"
        );

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| TurnError::Spawn(e.to_string()))?,
            Err(_) => return Err(TurnError::Timeout(self.config.timeout_secs)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TurnError::Failed {
                code: output.status.code(),
                stderr: truncate(stderr.trim(), MAX_STDERR_CHARS),
            });
        }

        parse_agent_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extract the session id and result text from the agent's stdout.
///
/// Accepts either a single JSON document or log lines followed by one.
fn parse_agent_output(stdout: &str) -> Result<TurnOutcome, TurnError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(TurnError::Protocol("empty output".to_string()));
    }

    let parsed: AgentResult = match serde_json::from_str(trimmed) {
        Ok(parsed) => parsed,
        Err(e) => {
            let last_line = trimmed.lines().rev().find(|l| !l.trim().is_empty());
            last_line
                .and_then(|line| serde_json::from_str(line.trim()).ok())
                .ok_or_else(|| TurnError::Protocol(e.to_string()))?
        }
    };

    if parsed.is_error {
        return Err(TurnError::Failed {
            code: None,
            stderr: parsed.result.unwrap_or_default(),
        });
    }

    let session_id = parsed
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(TurnError::MissingSessionId)?;

    Ok(TurnOutcome {
        session_id: SessionId::new(session_id),
        output: parsed.result,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Routes without running anything.
///
/// New turns get a fresh UUID; resumed turns keep their id.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl TurnExecutor for DryRunExecutor {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn execute(&self, request: &TurnRequest) -> Result<TurnOutcome, TurnError> {
        let session_id = match request.resume {
            Some(ref id) => id.clone(),
            None => SessionId::new(uuid::Uuid::new_v4().to_string()),
        };
        Ok(TurnOutcome {
            session_id,
            output: Some(format!(
                "dry run: {} turn in {} mode",
                request.task_kind, request.permission_mode
            )),
        })
    }
}
