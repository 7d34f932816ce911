//! Plan-versus-edit classification of incoming commands.
//!
//! The kind is recorded on each conversation and decides the permission
//! mode a turn runs with. The router never looks at it.

use std::fmt;

use murmur_core::PermissionMode;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a command asks the agent to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Produce a design or plan without touching files.
    Plan,
    /// Change the working tree.
    Edit,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Plan => "plan",
            TaskKind::Edit => "edit",
        }
    }

    /// Permission mode for a turn of this kind.
    ///
    /// Plan turns are always read-only; edit turns use the configured mode.
    pub fn permission_mode(&self, configured: PermissionMode) -> PermissionMode {
        match self {
            TaskKind::Plan => PermissionMode::Plan,
            TaskKind::Edit => configured,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(TaskKind::Plan),
            "edit" => Ok(TaskKind::Edit),
            _ => Err(format!("Unknown task kind: {}", s)),
        }
    }
}

/// Regex classifier for task kinds.
pub struct TaskKindDetector {
    plan_patterns: Vec<Regex>,
}

impl Default for TaskKindDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskKindDetector {
    pub fn new() -> Self {
        let plan_patterns = [
            r"(?i)\bplan\b",
            r"(?i)\bdesign\b",
            r"(?i)\barchitect(?:ure)?\b",
            r"(?i)\bpropos(?:e|al)\b",
            r"(?i)\bstrategy\b",
            r"(?i)\bapproach\s+for\b",
            r"(?i)\bblueprint\b",
        ]
        .iter()
        .map(|pat| Regex::new(pat).expect("Invalid plan regex"))
        .collect();

        Self { plan_patterns }
    }

    /// Classify a command.
    ///
    /// An explicit `plan` permission mode wins; otherwise any plan pattern
    /// makes it a plan, and everything else is an edit.
    pub fn detect(&self, command: &str, permission_mode: Option<PermissionMode>) -> TaskKind {
        if permission_mode == Some(PermissionMode::Plan) {
            return TaskKind::Plan;
        }
        if self.plan_patterns.iter().any(|re| re.is_match(command)) {
            return TaskKind::Plan;
        }
        TaskKind::Edit
    }
}
