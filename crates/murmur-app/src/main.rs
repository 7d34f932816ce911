//! Murmur application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration (file, then env, then flags)
//! 2. Build the session service and the turn executor
//! 3. Read one command per line from stdin and dispatch each on its own task
//! 4. Save the output of finished plan turns to the plan folder
//! 5. On EOF or Ctrl-C, stop reading and wait for in-flight turns

mod cli;
mod executor;
mod plans;

use std::sync::Arc;

use clap::Parser;
use murmur_core::MurmurConfig;
use murmur_session::{
    ConversationRegistry, DispatchError, DispatchReport, Dispatcher, SessionService, TaskKind,
    TurnExecutor,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use cli::CliArgs;
use executor::{AgentCliExecutor, DryRunExecutor};
use plans::PlanArchive;

/// One-line summary of a dispatched command.
fn format_report(report: &DispatchReport) -> String {
    let verdict = if report.resumed() { "resume" } else { "new" };
    let mut line = format!(
        "[{} {} {:.2} {}] {}",
        verdict,
        report.session_id,
        report.decision.confidence,
        report.task_kind,
        report.decision.reason
    );
    let output = report.output.as_deref().map(str::trim).unwrap_or_default();
    if !output.is_empty() {
        line.push('\n');
        line.push_str(output);
    }
    line
}

fn format_error(command: &str, error: &DispatchError) -> String {
    format!("[error] {}: {}", command, error)
}

/// Save the output of a finished plan turn. Other turns are ignored.
fn archive_plan(archive: &PlanArchive, report: &DispatchReport) -> Option<std::path::PathBuf> {
    if report.task_kind != TaskKind::Plan {
        return None;
    }
    let Some(output) = report.output.as_deref() else {
        tracing::info!(session_id = %report.session_id, "No plan to save");
        return None;
    };
    match archive.save(output) {
        Ok(Some(path)) => {
            tracing::info!(session_id = %report.session_id, path = %path.display(), "Plan saved");
            Some(path)
        }
        Ok(None) => {
            tracing::info!(session_id = %report.session_id, "No plan to save");
            None
        }
        Err(e) => {
            tracing::warn!(
                session_id = %report.session_id,
                folder = %archive.folder().display(),
                error = %e,
                "Failed to save plan"
            );
            None
        }
    }
}

/// Periodically mark turns stuck in flight as errored.
async fn stale_turn_reaper(registry: Arc<ConversationRegistry>, stale_after: chrono::Duration) {
    let period_secs = (stale_after.num_seconds() / 2).clamp(1, 60) as u64;
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(period_secs));
    tracing::info!(
        stale_after_secs = stale_after.num_seconds(),
        period_secs,
        "Stale turn reaper started"
    );

    loop {
        interval.tick().await;
        for session_id in registry.reap_stale_active(stale_after) {
            tracing::warn!(session_id = %session_id, "Turn exceeded stale window; conversation errored");
        }
    }
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = MurmurConfig::load_or_default(&config_file);
    config.apply_env_overrides()?;
    args.apply_to(&mut config)?;

    init_tracing(&config.general.log_level);
    tracing::info!("Starting murmur v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    let working_directory =
        cli::resolve_working_directory(config.general.working_directory.as_deref())?;
    tracing::info!(
        dir = %working_directory.display(),
        permission_mode = %config.general.permission_mode,
        "Working directory"
    );

    // Routing.
    let service = Arc::new(SessionService::new(
        config.registry.clone(),
        config.router.clone(),
    ));

    let executor: Arc<dyn TurnExecutor> = if args.dry_run {
        tracing::info!("Dry run: the agent will not be invoked");
        Arc::new(DryRunExecutor)
    } else {
        tracing::info!(program = %config.agent.program, "Agent executor ready");
        Arc::new(AgentCliExecutor::new(config.agent.clone()))
    };

    // Dry runs leave the plan folder alone.
    let plans = (!args.dry_run).then(|| {
        Arc::new(PlanArchive::new(&config.general.plan_folder, &working_directory))
    });
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&service),
        executor,
        working_directory,
        config.general.permission_mode,
    ));

    // === Background tasks ===

    if let Some(stale_after) = config.registry.stale_active_after() {
        let registry = Arc::clone(service.registry());
        tokio::spawn(async move {
            stale_turn_reaper(registry, stale_after).await;
        });
    }

    // === Command loop ===

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let command = match line {
                    Ok(Some(line)) => line.trim().to_string(),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                if command.is_empty() {
                    continue;
                }

                let dispatcher = Arc::clone(&dispatcher);
                let plans = plans.clone();
                in_flight.spawn(async move {
                    match dispatcher.handle(&command).await {
                        Ok(report) => {
                            if let Some(plans) = &plans {
                                archive_plan(plans, &report);
                            }
                            println!("{}", format_report(&report));
                        }
                        Err(e) => println!("{}", format_error(&command, &e)),
                    }
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Command task panicked");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; no longer accepting commands");
                break;
            }
        }
    }

    if !in_flight.is_empty() {
        tracing::info!(count = in_flight.len(), "Waiting for in-flight turns");
    }
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Command task panicked");
        }
    }

    tracing::info!(conversations = service.registry().len(), "Shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_session::{RoutingDecision, SessionId, TaskKind, TurnError};

    #[test]
    fn test_format_new_report() {
        let report = DispatchReport {
            decision: RoutingDecision::new_conversation(1.0, "no active conversations"),
            session_id: SessionId::new("s1"),
            task_kind: TaskKind::Edit,
            output: Some("  Fixed it.\n".into()),
        };
        assert_eq!(
            format_report(&report),
            "[new s1 1.00 edit] no active conversations\nFixed it."
        );
    }

    #[test]
    fn test_format_resume_report_without_output() {
        let report = DispatchReport {
            decision: RoutingDecision::resume(
                SessionId::new("s1"),
                0.85,
                "very recent; continuation signal".into(),
            ),
            session_id: SessionId::new("s1"),
            task_kind: TaskKind::Plan,
            output: Some("   ".into()),
        };
        assert_eq!(
            format_report(&report),
            "[resume s1 0.85 plan] very recent; continuation signal"
        );
    }

    #[test]
    fn test_format_error() {
        let err = DispatchError::Turn(TurnError::Timeout(600));
        assert_eq!(
            format_error("fix it", &err),
            "[error] fix it: Turn failed: Turn timed out after 600 seconds"
        );
    }

    fn report(task_kind: TaskKind, output: Option<&str>) -> DispatchReport {
        DispatchReport {
            decision: RoutingDecision::new_conversation(1.0, "no active conversations"),
            session_id: SessionId::new("s1"),
            task_kind,
            output: output.map(String::from),
        }
    }

    #[test]
    fn test_archive_plan_saves_plan_turns() {
        let dir = tempfile::tempdir().unwrap();
        let archive = PlanArchive::new(std::path::Path::new("plans"), dir.path());
        let path = archive_plan(
            &archive,
            &report(TaskKind::Plan, Some("# Plan: Caching Layer\n\n1. Add LRU")),
        )
        .unwrap();
        assert_eq!(path, dir.path().join("plans").join("caching_layer.md"));
        assert!(path.exists());
    }

    #[test]
    fn test_archive_plan_skips_edits_and_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let archive = PlanArchive::new(std::path::Path::new("plans"), dir.path());
        assert!(archive_plan(&archive, &report(TaskKind::Edit, Some("# Plan: Nope"))).is_none());
        assert!(archive_plan(&archive, &report(TaskKind::Plan, None)).is_none());
        assert!(archive_plan(&archive, &report(TaskKind::Plan, Some(""))).is_none());
        assert!(!dir.path().join("plans").exists());
    }

    #[test]
    fn test_archive_plan_reports_unwritable_folder() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("plans");
        std::fs::write(&blocker, "not a folder").unwrap();
        let archive = PlanArchive::new(&blocker, dir.path());
        assert!(archive_plan(&archive, &report(TaskKind::Plan, Some("# Plan: X"))).is_none());
    }

    #[tokio::test]
    async fn test_dry_run_dispatch_end_to_end() {
        let service = Arc::new(SessionService::new(
            murmur_core::RegistryConfig::default(),
            murmur_core::RouterConfig::default(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&service),
            Arc::new(DryRunExecutor),
            std::env::temp_dir(),
            murmur_core::PermissionMode::AcceptEdits,
        );

        let first = dispatcher.handle("fix the auth bug").await.unwrap();
        let second = dispatcher.handle("also add a test for that").await.unwrap();
        assert!(!first.resumed());
        assert!(second.resumed());
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(service.registry().len(), 1);
    }
}
