use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MurmurError, Result};

/// Top-level configuration for Murmur.
///
/// Loaded from `~/.murmur/config.toml` by default. Environment variables
/// with the `MURMUR_` prefix override file values, and CLI flags override
/// both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MurmurConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl MurmurConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MurmurConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply `MURMUR_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `MURMUR_*` overrides using an arbitrary variable lookup.
    ///
    /// Unset variables leave the current value untouched; values that fail
    /// to parse are rejected rather than ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("MURMUR_LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(dir) = lookup("MURMUR_WORKING_DIRECTORY") {
            self.general.working_directory = Some(PathBuf::from(dir));
        }
        if let Some(mode) = lookup("MURMUR_PERMISSION_MODE") {
            self.general.permission_mode = mode.parse()?;
        }
        if let Some(folder) = lookup("MURMUR_PLAN_FOLDER") {
            self.general.plan_folder = PathBuf::from(folder);
        }
        if let Some(raw) = lookup("MURMUR_CONFIDENCE_THRESHOLD") {
            self.router.confidence_threshold =
                raw.parse().map_err(|_| MurmurError::InvalidValue {
                    field: "MURMUR_CONFIDENCE_THRESHOLD".into(),
                    reason: format!("not a number: {raw}"),
                })?;
        }
        if let Some(program) = lookup("MURMUR_AGENT_PROGRAM") {
            self.agent.program = program;
        }
        self.validate()
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let router = &self.router;
        if !(0.0..=1.0).contains(&router.confidence_threshold) {
            return Err(invalid(
                "router.confidence_threshold",
                "must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&router.continuation_boost) {
            return Err(invalid("router.continuation_boost", "must be within [0, 1]"));
        }
        if router.recency_half_life_secs == 0 {
            return Err(invalid("router.recency_half_life_secs", "must be positive"));
        }
        for (field, weight) in [
            ("router.keyword_weight", router.keyword_weight),
            ("router.recency_weight", router.recency_weight),
            ("router.continuation_weight", router.continuation_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(field, "must be a non-negative number"));
            }
        }
        if self.registry.max_conversations == 0 {
            return Err(invalid("registry.max_conversations", "must be at least 1"));
        }
        if self.general.plan_folder.as_os_str().is_empty() {
            return Err(invalid("general.plan_folder", "must not be empty"));
        }
        if self.agent.program.trim().is_empty() {
            return Err(invalid("agent.program", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> MurmurError {
    MurmurError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Directory the agent runs in. `None` means the process working directory.
    pub working_directory: Option<PathBuf>,
    /// Permission mode for edit turns. Plan turns always run in `plan` mode.
    pub permission_mode: PermissionMode,
    /// Where finished plans are written, one markdown file each. Relative
    /// paths resolve against the working directory.
    pub plan_folder: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            working_directory: None,
            permission_mode: PermissionMode::AcceptEdits,
            plan_folder: PathBuf::from("plans"),
        }
    }
}

/// Permission mode handed to the agent for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Plan => "plan",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "plan" => Ok(PermissionMode::Plan),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            other => Err(invalid(
                "permission_mode",
                &format!(
                    "unknown mode '{other}' (expected default, acceptEdits, plan or bypassPermissions)"
                ),
            )),
        }
    }
}

/// Conversation registry bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Idle conversations older than this are no longer routable and get evicted.
    pub expiry_window_secs: u64,
    /// Upper bound on retained conversations.
    pub max_conversations: usize,
    /// Active conversations untouched for this long are marked errored.
    /// Zero disables the reaper.
    pub stale_active_secs: u64,
}

impl RegistryConfig {
    pub fn expiry_window(&self) -> Duration {
        secs(self.expiry_window_secs)
    }

    /// The reaper threshold, or `None` when disabled.
    pub fn stale_active_after(&self) -> Option<Duration> {
        (self.stale_active_secs > 0).then(|| secs(self.stale_active_secs))
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            expiry_window_secs: 30 * 60,
            max_conversations: 20,
            stale_active_secs: 0,
        }
    }
}

/// Routing score weights and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Conversations touched within this window score full recency.
    pub strong_recency_secs: u64,
    /// Half-life of the recency decay past the strong window.
    pub recency_half_life_secs: u64,
    /// Minimum score needed to resume a conversation.
    pub confidence_threshold: f64,
    pub keyword_weight: f64,
    pub recency_weight: f64,
    pub continuation_weight: f64,
    /// Score floor for a continuation phrase on a very recent conversation.
    pub continuation_boost: f64,
}

impl RouterConfig {
    pub fn strong_recency(&self) -> Duration {
        secs(self.strong_recency_secs)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strong_recency_secs: 3 * 60,
            recency_half_life_secs: 10 * 60,
            confidence_threshold: 0.45,
            keyword_weight: 0.4,
            recency_weight: 0.3,
            continuation_weight: 0.3,
            continuation_boost: 0.85,
        }
    }
}

/// External agent invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable, resolved through `PATH`.
    pub program: String,
    /// Tools the agent may use without asking.
    pub allowed_tools: Vec<String>,
    /// Arguments placed between the program and the generated flags,
    /// e.g. the package name when `program` is a launcher like `npx`.
    pub extra_args: Vec<String>,
    /// Upper bound on a single turn.
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            allowed_tools: vec!["Read".to_string(), "Write".to_string(), "Bash".to_string()],
            extra_args: vec![],
            timeout_secs: 600,
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = MurmurConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.general.working_directory.is_none());
        assert_eq!(config.general.permission_mode, PermissionMode::AcceptEdits);
        assert_eq!(config.general.plan_folder, PathBuf::from("plans"));
        assert_eq!(config.registry.expiry_window_secs, 1800);
        assert_eq!(config.registry.max_conversations, 20);
        assert_eq!(config.registry.stale_active_secs, 0);
        assert_eq!(config.router.strong_recency_secs, 180);
        assert_eq!(config.router.recency_half_life_secs, 600);
        assert!((config.router.confidence_threshold - 0.45).abs() < f64::EPSILON);
        assert!((config.router.continuation_boost - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.agent.program, "claude");
        assert_eq!(config.agent.allowed_tools, vec!["Read", "Write", "Bash"]);
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let router = RouterConfig::default();
        let sum = router.keyword_weight + router.recency_weight + router.continuation_weight;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
working_directory = "/work/project"
permission_mode = "bypassPermissions"
plan_folder = "/work/plans"

[registry]
expiry_window_secs = 600
max_conversations = 5

[router]
confidence_threshold = 0.6
"#;
        let file = create_temp_config(content);
        let config = MurmurConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(
            config.general.working_directory,
            Some(PathBuf::from("/work/project"))
        );
        assert_eq!(
            config.general.permission_mode,
            PermissionMode::BypassPermissions
        );
        assert_eq!(config.general.plan_folder, PathBuf::from("/work/plans"));
        assert_eq!(config.registry.expiry_window_secs, 600);
        assert_eq!(config.registry.max_conversations, 5);
        assert!((config.router.confidence_threshold - 0.6).abs() < f64::EPSILON);
        // Untouched fields keep their defaults
        assert_eq!(config.router.strong_recency_secs, 180);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[general]\nlog_level = \"warn\"\n");
        let config = MurmurConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.registry.max_conversations, 20);
        assert_eq!(config.agent.timeout_secs, 600);
    }

    #[test]
    fn test_config_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = MurmurConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.registry.expiry_window_secs, 1800);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(MurmurConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_out_of_range_threshold() {
        let file = create_temp_config("[router]\nconfidence_threshold = 1.5\n");
        let err = MurmurConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, MurmurError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_rejects_unknown_permission_mode() {
        let file = create_temp_config("[general]\npermission_mode = \"yolo\"\n");
        assert!(MurmurConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = MurmurConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.registry.max_conversations, 20);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = MurmurConfig::default();
        config.registry.max_conversations = 7;
        config.general.permission_mode = PermissionMode::Plan;
        config.save(&path).unwrap();

        let reloaded = MurmurConfig::load(&path).unwrap();
        assert_eq!(reloaded.registry.max_conversations, 7);
        assert_eq!(reloaded.general.permission_mode, PermissionMode::Plan);
        assert_eq!(reloaded.agent.program, config.agent.program);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MurmurConfig::default();
        config
            .apply_overrides_from(env(&[
                ("MURMUR_LOG_LEVEL", "trace"),
                ("MURMUR_WORKING_DIRECTORY", "/srv/app"),
                ("MURMUR_PERMISSION_MODE", "default"),
                ("MURMUR_PLAN_FOLDER", "docs/plans"),
                ("MURMUR_CONFIDENCE_THRESHOLD", "0.7"),
                ("MURMUR_AGENT_PROGRAM", "/opt/bin/agent"),
            ]))
            .unwrap();
        assert_eq!(config.general.log_level, "trace");
        assert_eq!(
            config.general.working_directory,
            Some(PathBuf::from("/srv/app"))
        );
        assert_eq!(config.general.permission_mode, PermissionMode::Default);
        assert_eq!(config.general.plan_folder, PathBuf::from("docs/plans"));
        assert!((config.router.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.agent.program, "/opt/bin/agent");
    }

    #[test]
    fn test_env_overrides_absent_keeps_values() {
        let mut config = MurmurConfig::default();
        config.general.log_level = "debug".into();
        config.apply_overrides_from(env(&[])).unwrap();
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_env_override_bad_threshold_is_rejected() {
        let mut config = MurmurConfig::default();
        let err = config
            .apply_overrides_from(env(&[("MURMUR_CONFIDENCE_THRESHOLD", "high")]))
            .unwrap_err();
        assert!(err.to_string().contains("MURMUR_CONFIDENCE_THRESHOLD"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = MurmurConfig::default();
        config.registry.max_conversations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_plan_folder() {
        let mut config = MurmurConfig::default();
        config.general.plan_folder = PathBuf::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("general.plan_folder"));
    }

    #[test]
    fn test_huge_expiry_window_is_valid_and_clamped() {
        let mut config = MurmurConfig::default();
        config.registry.expiry_window_secs = u64::MAX;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.registry.expiry_window(),
            Duration::seconds(i64::MAX / 1_000)
        );
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let mut config = MurmurConfig::default();
        config.router.recency_weight = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_permission_mode_round_trip_strings() {
        for mode in [
            PermissionMode::Default,
            PermissionMode::AcceptEdits,
            PermissionMode::Plan,
            PermissionMode::BypassPermissions,
        ] {
            let parsed: PermissionMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_duration_helpers() {
        let registry = RegistryConfig::default();
        assert_eq!(registry.expiry_window(), Duration::minutes(30));
        assert!(registry.stale_active_after().is_none());

        let registry = RegistryConfig {
            stale_active_secs: 900,
            ..RegistryConfig::default()
        };
        assert_eq!(registry.stale_active_after(), Some(Duration::minutes(15)));

        let router = RouterConfig::default();
        assert_eq!(router.strong_recency(), Duration::minutes(3));
    }
}
