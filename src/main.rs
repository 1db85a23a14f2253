use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;

use branchflow::api::{ApiError, Capabilities};
use branchflow::branch::BranchKind;
use branchflow::config::Config;
use branchflow::git::GitCli;
use branchflow::hooks::HookInstaller;
use branchflow::ledger::IssueLedger;
use branchflow::lifecycle::{
    BranchLifecycle, CloseOutcome, InitOutcome, LifecycleError, MergeRequestOutcome,
};
use branchflow::logging;
use branchflow::projects::{Integration, PathRegistry};
use branchflow::prompt::InquirePrompter;
use branchflow::sequencer::{CommandSequencer, SystemProcessRunner};
use branchflow::store::{ConfigStore, JsonFileStore};
use branchflow::timelog::{self, TimeLogOutcome};

#[derive(Parser)]
#[command(name = "branchflow")]
#[command(about = "Feature, release and hotfix branches with Redmine and GitLab integration")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

/// Flags shared by `init` and `close`
#[derive(Args, Debug, Clone)]
struct RunFlags {
    /// Do not pull from or push to the remote
    #[arg(long, visible_alias = "n1")]
    no_update: bool,

    /// Print every git command before it runs
    #[arg(long, visible_alias = "s1")]
    show_commands: bool,

    /// Saved project alias (prompted when omitted)
    #[arg(short, long)]
    project: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a feature, release or hotfix branch
    #[command(visible_alias = "i")]
    Init {
        /// Branch kind (feature, release, hotfix)
        #[arg(short, long, value_parser = parse_kind)]
        kind: Option<BranchKind>,

        /// Feature name or version (prompted when omitted)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// Merge, tag and publish the current branch
    #[command(visible_alias = "c")]
    Close {
        #[command(flatten)]
        flags: RunFlags,
    },

    /// List saved projects
    Projects,

    /// Print the effective configuration
    Config,

    /// Entry points for installed git hooks
    #[command(hide = true)]
    Hook {
        #[command(subcommand)]
        hook: HookCommands,
    },
}

#[derive(Subcommand)]
enum HookCommands {
    /// Log time for a commit on a tracked branch
    PostCommit {
        #[arg(long)]
        issue: u64,

        #[arg(long)]
        branch: String,

        /// Last commit message (may start with `-`)
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        message: String,
    },
}

fn parse_kind(value: &str) -> Result<BranchKind, String> {
    BranchKind::from_key(value)
        .ok_or_else(|| format!("unknown branch kind '{}' (feature, release, hotfix)", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let _logging_handle = logging::init_logging(&config, cli.debug)?;

    let ok = match cli.command {
        Commands::Init { kind, name, flags } => cmd_init(&config, kind, name, flags).await?,
        Commands::Close { flags } => cmd_close(&config, flags).await?,
        Commands::Projects => cmd_projects(&config)?,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            true
        }
        Commands::Hook {
            hook:
                HookCommands::PostCommit {
                    issue,
                    branch,
                    message,
                },
        } => cmd_post_commit(&config, issue, &branch, &message).await?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn success(message: impl AsRef<str>) {
    println!("[success] {}", message.as_ref());
}

fn info(message: impl AsRef<str>) {
    println!("[info] {}", message.as_ref());
}

fn warning(message: impl AsRef<str>) {
    eprintln!("[warning] {}", message.as_ref());
}

fn error(message: impl AsRef<str>) {
    eprintln!("[error] {}", message.as_ref());
}

fn open_store(config: &Config) -> Arc<dyn ConfigStore> {
    Arc::new(JsonFileStore::new(config.store_path()))
}

fn build_lifecycle(config: &Config, store: Arc<dyn ConfigStore>, flags: &RunFlags) -> BranchLifecycle {
    let mut sequencer = CommandSequencer::new(Arc::new(SystemProcessRunner));
    if flags.show_commands {
        sequencer = sequencer.with_observer(|line| warning(line));
    }

    BranchLifecycle::new(
        config.branches.clone(),
        sequencer,
        IssueLedger::new(store),
        Arc::new(InquirePrompter),
        Capabilities::from_config(config),
        HookInstaller::new(config.hooks.executable_path(), config.store_path()),
    )
    .with_no_update(flags.no_update)
}

fn require_git() -> bool {
    if GitCli::is_installed() {
        return true;
    }
    error("git is required but was not found on PATH");
    false
}

async fn cmd_init(
    config: &Config,
    kind: Option<BranchKind>,
    name: Option<String>,
    flags: RunFlags,
) -> Result<bool> {
    if !require_git() {
        return Ok(false);
    }

    let store = open_store(config);
    let registry = PathRegistry::new(store.clone());
    let lifecycle = build_lifecycle(config, store, &flags);

    let result = run_init(&lifecycle, &registry, flags.project.as_deref(), kind, name).await;

    match result {
        Ok(outcome) => {
            report_init(&outcome);
            Ok(true)
        }
        Err(e) => {
            error(e.to_string());
            Ok(false)
        }
    }
}

async fn run_init(
    lifecycle: &BranchLifecycle,
    registry: &PathRegistry,
    project: Option<&str>,
    kind: Option<BranchKind>,
    name: Option<String>,
) -> Result<InitOutcome, LifecycleError> {
    let ctx = lifecycle.select_context(registry, project).await?;
    let kind = lifecycle.choose_kind(kind)?;
    lifecycle.init(&ctx, kind, name).await
}

fn report_init(outcome: &InitOutcome) {
    success(format!("created '{}' branch successfully", outcome.branch));
    if let Some(record) = &outcome.tracked {
        info(format!(
            "tracking issue #{} on '{}'",
            record.issue_id, record.branch_name
        ));
    }
    for effect in &outcome.side_effects {
        warning(effect.to_string());
    }
}

async fn cmd_close(config: &Config, flags: RunFlags) -> Result<bool> {
    if !require_git() {
        return Ok(false);
    }

    let store = open_store(config);
    let registry = PathRegistry::new(store.clone());
    let lifecycle = build_lifecycle(config, store, &flags);

    let result = run_close(&lifecycle, &registry, flags.project.as_deref()).await;

    match result {
        Ok(outcome) => {
            report_close(&outcome);
            Ok(true)
        }
        Err(e) => {
            error(e.to_string());
            Ok(false)
        }
    }
}

async fn run_close(
    lifecycle: &BranchLifecycle,
    registry: &PathRegistry,
    project: Option<&str>,
) -> Result<CloseOutcome, LifecycleError> {
    let ctx = lifecycle.select_context(registry, project).await?;
    lifecycle.close(&ctx).await
}

fn report_close(outcome: &CloseOutcome) {
    if outcome.pushed {
        success(format!("pushed '{}' branch successfully", outcome.branch));
    } else {
        success(format!("closed '{}' branch successfully", outcome.branch));
    }

    if let (Some(issue_id), Some(status)) = (outcome.linked_issue, &outcome.status) {
        success(format!("issue #{} moved to '{}'", issue_id, status.name));
    }

    for request in &outcome.merge_requests {
        match request {
            MergeRequestOutcome::Created { target, info: mr } => {
                success(format!(
                    "created merge request from '{}' to '{}' branch",
                    outcome.branch, target
                ));
                if let Some(url) = &mr.web_url {
                    info(url);
                }
            }
            MergeRequestOutcome::Manual { target } => info(format!(
                "Now you can create merge request from '{}' to '{}' branch",
                outcome.branch, target
            )),
            // Reported with the other side effects below
            MergeRequestOutcome::Failed { .. } => {}
        }
    }

    for effect in &outcome.side_effects {
        warning(effect.to_string());
    }
}

fn cmd_projects(config: &Config) -> Result<bool> {
    let registry = PathRegistry::new(open_store(config));
    let projects = registry.projects()?;
    let last = registry.last_selected()?;

    if projects.is_empty() {
        println!("No saved projects (run 'branchflow init' to add one)");
        return Ok(true);
    }

    println!("Saved projects ({})", projects.len());
    println!("{}", "─".repeat(60));

    for project in &projects {
        let marker = if last.as_deref() == Some(project.alias.as_str()) {
            "*"
        } else {
            " "
        };
        let integrations: Vec<&str> = project
            .integrations
            .iter()
            .map(|i| match i {
                Integration::IssueTracker => "redmine",
                Integration::MergeHost => "gitlab",
            })
            .collect();

        println!(
            "{} {} {} [{} <- {}, remote {}] {}",
            marker,
            project.alias,
            project.working_directory.display(),
            project.master_branch,
            project.dev_branch,
            project.remote,
            integrations.join(",")
        );
    }

    Ok(true)
}

async fn cmd_post_commit(config: &Config, issue: u64, branch: &str, message: &str) -> Result<bool> {
    let capabilities = Capabilities::from_config(config);
    let tracker = capabilities
        .tracker
        .ok_or_else(|| ApiError::not_configured("redmine"))?;
    let ledger = IssueLedger::new(open_store(config));

    let outcome = timelog::record_commit(
        &ledger,
        tracker.as_ref(),
        issue,
        branch,
        message,
        chrono::Utc::now(),
    )
    .await
    .context("post-commit time log failed")?;

    match outcome {
        TimeLogOutcome::Logged { hours } => {
            success(format!("logged {} h on issue #{}", hours, issue))
        }
        TimeLogOutcome::Skipped { minutes } => {
            info(format!("{} min since last log, nothing logged", minutes))
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_aliases() {
        let cli = Cli::try_parse_from(["branchflow", "i", "--n1", "--s1", "--kind", "release"])
            .unwrap();
        match cli.command {
            Commands::Init { kind, name, flags } => {
                assert_eq!(kind, Some(BranchKind::Release));
                assert!(name.is_none());
                assert!(flags.no_update);
                assert!(flags.show_commands);
            }
            _ => panic!("expected init"),
        }

        let cli = Cli::try_parse_from(["branchflow", "c", "--project", "api"]).unwrap();
        match cli.command {
            Commands::Close { flags } => {
                assert_eq!(flags.project.as_deref(), Some("api"));
                assert!(!flags.no_update);
            }
            _ => panic!("expected close"),
        }
    }

    #[test]
    fn test_cli_hook_message_may_start_with_hyphen() {
        let cli = Cli::try_parse_from([
            "branchflow",
            "hook",
            "post-commit",
            "--issue",
            "12",
            "--branch",
            "feature/login#12",
            "--message",
            "- fix login form\n- tidy styles",
        ])
        .unwrap();
        match cli.command {
            Commands::Hook {
                hook: HookCommands::PostCommit { message, .. },
            } => assert_eq!(message, "- fix login form\n- tidy styles"),
            _ => panic!("expected hook post-commit"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["branchflow", "init", "--kind", "bugfix"]).is_err());
    }

    #[test]
    fn test_cli_hook_post_commit() {
        let cli = Cli::try_parse_from([
            "branchflow",
            "hook",
            "post-commit",
            "--issue",
            "12",
            "--branch",
            "feature/login#12",
            "--message",
            "add form",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Hook {
                hook: HookCommands::PostCommit { issue: 12, .. }
            }
        ));
    }
}
