//! CLI argument definitions for the murmur binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::{Path, PathBuf};

use clap::Parser;
use murmur_core::{MurmurConfig, MurmurError};

/// Murmur: routes spoken or typed commands to the right agent conversation.
#[derive(Parser, Debug)]
#[command(name = "murmur", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Directory the agent works in. Must already exist.
    #[arg(short = 'w', long = "working-directory")]
    pub working_directory: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Route commands without invoking the agent.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Agent executable to invoke.
    #[arg(short = 'a', long = "agent")]
    pub agent: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MURMUR_CONFIG env var > ~/.murmur/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(|key| std::env::var(key).ok())
    }

    fn resolve_config_path_with<F>(&self, lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = lookup("MURMUR_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path(lookup)
    }

    /// Fold the flags that were given into an already env-adjusted config.
    pub fn apply_to(&self, config: &mut MurmurConfig) -> Result<(), MurmurError> {
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(ref dir) = self.working_directory {
            config.general.working_directory = Some(dir.clone());
        }
        if let Some(ref agent) = self.agent {
            config.agent.program = agent.clone();
        }
        config.validate()
    }
}

/// The directory turns run in: the configured one, or the process cwd.
///
/// Fails unless it names an existing directory.
pub fn resolve_working_directory(configured: Option<&Path>) -> Result<PathBuf, MurmurError> {
    let dir = match configured {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    if !dir.is_dir() {
        return Err(MurmurError::InvalidValue {
            field: "working_directory".into(),
            reason: format!("{} is not a directory", dir.display()),
        });
    }
    Ok(dir)
}

/// Default config file path for the current platform.
fn default_config_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let home_var = if cfg!(target_os = "windows") {
        "USERPROFILE"
    } else {
        "HOME"
    };
    match lookup(home_var) {
        Some(home) => PathBuf::from(home).join(".murmur").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
