// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! worktree-task main entry point - CLI and command dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use worktree_task::config::{self, CliOptions, ResolvedConfig};
use worktree_task::lifecycle::{
    CleanupReport, IntegrationReport, IntegrationRequest, LaunchRequest, LifecycleController,
    ResumeOutcome, ResumeReport, ResumeRequest, StatusReport,
};
use worktree_task::multiplexer::{Multiplexer, TmuxClient};
use worktree_task::notify::{DesktopNotifier, Notifier};
use worktree_task::supervise::Monitor;
use worktree_task::telemetry::{init_telemetry, TelemetryConfig};
use worktree_task::workspace::{GitOperation, GitRepo, GitWorktreeIsolator};
use worktree_task::{PreconditionError, SupervisorError};

/// Supervise coding-agent sessions running in git worktrees and tmux.
#[derive(Parser)]
#[command(name = "worktree-task")]
#[command(author, version, about = "Supervise coding-agent sessions in git worktrees", long_about = None)]
struct Cli {
    /// Session discovery pattern (regex; `{project}` is replaced)
    #[arg(long, global = true)]
    session_pattern: Option<String>,

    /// Journal file
    #[arg(long, global = true)]
    log_path: Option<PathBuf>,

    /// Show debug output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one monitor pass over all supervised sessions
    Monitor {
        /// Classify only; send nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Start a task in a new worktree and session
    Launch {
        /// Branch to work on (created if missing)
        branch: String,
        /// What the agent should do
        description: String,
        /// Agent from the configured agent table
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Nudge a session that stopped
    Resume {
        session: String,
        /// Custom message to send
        message: Option<String>,
        /// Resend the last instruction verbatim
        #[arg(long, conflicts_with = "message")]
        retry: bool,
        /// Only report what was detected
        #[arg(long)]
        check: bool,
        /// Send a generic continue message even when nothing is detected
        #[arg(long)]
        force: bool,
    },

    /// Terminate a session, keeping its worktree unless asked
    Cleanup {
        session: String,
        /// Also remove the session's worktree (the branch is kept)
        #[arg(long)]
        remove_worktree: bool,
    },

    /// Merge a feature branch into the current branch
    Merge {
        feature: String,
    },

    /// Rebase the current branch onto a feature branch
    Rebase {
        feature: String,
    },

    /// Show sessions and worktrees, or details for one session
    Status {
        session: Option<String>,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration
    Show,
    /// Write a default config file in the repository root
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_telemetry(&TelemetryConfig::for_verbosity(cli.verbose)) {
        eprintln!("{} {}", "warning:".yellow(), e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let options = CliOptions {
        session_pattern: cli.session_pattern.clone(),
        log_path: cli.log_path.clone(),
        agent: match &cli.command {
            Commands::Launch { agent, .. } => agent.clone(),
            _ => None,
        },
    };

    match cli.command {
        Commands::Monitor { dry_run } => {
            let root = match GitRepo::discover(&cwd).await {
                Ok(repo) => repo.primary_root().await,
                Err(_) => cwd.clone(),
            };
            let config = config::load_config(&root, options)?;
            let project = project_name(&root);
            let mut monitor = Monitor::from_config(multiplexer(&config), &project, &config)?;
            if let Some(notifier) = notifier(&config) {
                monitor = monitor.with_notifier(notifier);
            }
            let summary = monitor.run(dry_run, cli.verbose).await?;
            let text = summary.render(cli.verbose);
            if summary.failed > 0 {
                println!("{}", text.yellow());
            } else {
                println!("{}", text);
            }
        }
        Commands::Launch {
            branch,
            description,
            agent,
        } => {
            let controller = controller(&cwd, options).await?;
            let report = controller
                .launch(LaunchRequest {
                    branch,
                    description,
                    agent,
                })
                .await?;
            let task = &report.task;
            println!("{} Launched {}", "✓".green(), task.session.bright_white().bold());
            println!("  branch:   {} ({:?})", task.branch, report.origin);
            println!("  worktree: {}", task.worktree.display());
            println!("  agent:    {}", task.agent_command.dimmed());
            println!("\n{}", format!("Attach with: tmux attach -t {}", task.session).dimmed());
        }
        Commands::Resume {
            session,
            message,
            retry,
            check,
            force,
        } => {
            let controller = controller(&cwd, options).await?;
            let report = controller
                .resume(ResumeRequest {
                    session,
                    message,
                    retry,
                    check,
                    force,
                })
                .await?;
            print_resume(&report);
        }
        Commands::Cleanup {
            session,
            remove_worktree,
        } => {
            let controller = controller(&cwd, options).await?;
            let report = controller.cleanup(&session, remove_worktree).await?;
            print_cleanup(&report);
        }
        Commands::Merge { feature } => {
            integrate(&cwd, options, GitOperation::Merge, feature).await?;
        }
        Commands::Rebase { feature } => {
            integrate(&cwd, options, GitOperation::Rebase, feature).await?;
        }
        Commands::Status { session } => {
            let controller = controller(&cwd, options).await?;
            match controller.status(session.as_deref()).await {
                Ok(report) => print_status(&report),
                Err(e @ SupervisorError::Precondition(PreconditionError::SessionNotFound(_))) => {
                    if let Ok(overview) = controller.status(None).await {
                        print_status(&overview);
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Config { action } => {
            let root = match GitRepo::discover(&cwd).await {
                Ok(repo) => repo.primary_root().await,
                Err(_) => cwd.clone(),
            };
            match action {
                Some(ConfigAction::Show) | None => {
                    let config = config::load_config(&root, options)?;
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                Some(ConfigAction::Init) => {
                    let path = config::init_config(&root)?;
                    println!("Created config file: {}", path.display());
                }
            }
        }
    }
    Ok(())
}

fn project_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

fn multiplexer(config: &ResolvedConfig) -> Arc<dyn Multiplexer> {
    Arc::new(TmuxClient::new().with_timeout(Duration::from_millis(config.capture_timeout_ms)))
}

fn notifier(config: &ResolvedConfig) -> Option<Arc<dyn Notifier>> {
    config
        .notifications
        .then(|| Arc::new(DesktopNotifier::new()) as Arc<dyn Notifier>)
}

async fn controller(cwd: &Path, options: CliOptions) -> anyhow::Result<LifecycleController> {
    let isolator = GitWorktreeIsolator::discover(cwd)
        .await
        .map_err(SupervisorError::from)?;
    let config = config::load_config(isolator.repo().root(), options)?;
    let mut controller =
        LifecycleController::new(multiplexer(&config), Arc::new(isolator), config.clone())?
            .with_progress(true);
    if let Some(notifier) = notifier(&config) {
        controller = controller.with_notifier(notifier);
    }
    Ok(controller)
}

async fn integrate(
    cwd: &Path,
    options: CliOptions,
    operation: GitOperation,
    feature: String,
) -> anyhow::Result<()> {
    let controller = controller(cwd, options).await?;
    println!("{} {} {}", "→".cyan(), operation, feature.bright_white());
    let report = controller
        .integrate(IntegrationRequest { operation, feature })
        .await?;
    print_integration(&report);
    Ok(())
}

fn print_resume(report: &ResumeReport) {
    println!("{} {}", "Session:".bold(), report.session);
    println!("{} {} ({})", "Detected:".bold(), report.state, report.verdict);
    if !report.before.is_empty() {
        println!("\n{}", "Recent output:".dimmed());
        println!("{}", report.before.dimmed());
    }
    match &report.outcome {
        ResumeOutcome::Checked => {}
        ResumeOutcome::NothingToDo => {
            println!(
                "\n{}",
                "Nothing to resume. Pass a message, --retry or --force to send anyway.".cyan()
            );
        }
        ResumeOutcome::Sent { message } => {
            println!("\n{} {}", "✓ Sent:".green(), message);
            if let Some(after) = &report.after {
                println!("\n{}", "Response:".dimmed());
                println!("{}", after);
            }
        }
    }
}

fn print_cleanup(report: &CleanupReport) {
    if report.found {
        println!("{} Terminated {}", "✓".green(), report.session.bright_white());
    } else {
        println!("{} Session {} not found", "!".yellow(), report.session);
    }
    match (&report.worktree, report.worktree_removed) {
        (Some(path), true) => println!("  worktree removed: {}", path.display()),
        (Some(path), false) => println!("  worktree kept:    {}", path.display()),
        (None, _) => {}
    }
    if let Some(branch) = &report.branch {
        println!("  branch kept:      {}", branch);
    }
    if !report.remaining.is_empty() {
        println!("\n{}", "Remaining worktrees:".bold());
        for wt in &report.remaining {
            println!(
                "  {}  {}",
                wt.path.display(),
                wt.branch.as_deref().unwrap_or("(detached)").dimmed()
            );
        }
    }
}

fn print_status(report: &StatusReport) {
    match report {
        StatusReport::Overview { sessions, worktrees } => {
            println!("{}", "Sessions:".bold());
            if sessions.is_empty() {
                println!("  {}", "(none)".dimmed());
            }
            for session in sessions {
                println!("  {}", session);
            }
            println!("\n{}", "Worktrees:".bold());
            for wt in worktrees {
                let marker = if wt.is_primary { "*" } else { " " };
                println!(
                    "{} {}  {}",
                    marker,
                    wt.path.display(),
                    wt.branch.as_deref().unwrap_or("(detached)").dimmed()
                );
            }
        }
        StatusReport::Detail(detail) => {
            println!("{} {}", "Session:".bold(), detail.session.bright_white());
            println!("{} {}", "State:".bold(), detail.state);
            if let Some(dir) = &detail.dir {
                println!("{} {}", "Directory:".bold(), dir.display());
            }
            if let Some(git) = &detail.git {
                println!(
                    "{} {}",
                    "Branch:".bold(),
                    git.branch.as_deref().unwrap_or("(detached)")
                );
                println!("{} {}", "Changed files:".bold(), git.changed_files);
                if !git.ahead.is_empty() {
                    println!("{}", "Commits:".bold());
                    for commit in &git.ahead {
                        println!("  {}", commit);
                    }
                }
            }
            match &detail.verdict {
                Some(v) if v.stalled() => println!("{} {}", "Stall:".bold(), v.to_string().yellow()),
                Some(_) => println!("{} {}", "Stall:".bold(), "none".green()),
                None => println!("{} {}", "Stall:".bold(), "output unreadable".dimmed()),
            }
            if !detail.output.is_empty() {
                println!("\n{}", "Recent output:".dimmed());
                println!("{}", detail.output);
            }
        }
    }
}

fn print_integration(report: &IntegrationReport) {
    for phase in &report.phases {
        match &phase.resolved_by {
            Some(session) => println!(
                "  {} {} (conflicts resolved by {})",
                "✓".green(),
                phase.phase,
                session
            ),
            None => println!("  {} {}", "✓".green(), phase.phase),
        }
    }
    println!(
        "{} {} {} into {}",
        "✓".green(),
        report.operation,
        report.feature.bright_white(),
        report.target.bright_white()
    );
}
