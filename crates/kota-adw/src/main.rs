//! adw - entry point for the workflow orchestrator binary.

use clap::{Parser, Subcommand};
use kota_adw::agent::ClaudeAgent;
use kota_adw::batch::{self, BatchOptions, IssueSuccess};
use kota_adw::Orchestrator;
use kota_core::{AdwConfig, AdwExit, KotaConfig};
use kotadb::domains::DomainRules;
use kotadb::storage::Storage;
use kotadb::tools::ToolContext;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "adw", version, about = "Autonomous developer workflow orchestrator")]
struct Cli {
    /// Workspace root. Defaults to the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full workflow for one issue.
    Run {
        issue: u64,
        /// Read the issue payload from a JSON file instead of the forge CLI.
        #[arg(long)]
        issue_file: Option<PathBuf>,
    },
    /// Resume an issue from its checkpoint.
    Resume {
        issue: u64,
        #[arg(long)]
        issue_file: Option<PathBuf>,
    },
    /// Run a batch of issues with bounded concurrency.
    Batch {
        issues: Vec<u64>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        fail_fast: bool,
    },
    /// Remove a leftover worktree and its branch for an issue.
    CleanWorktree {
        issue: u64,
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot start runtime");
            AdwExit::Unexpected.exit();
        }
    };
    let exit = runtime.block_on(run(cli));
    exit.exit();
}

async fn run(cli: Cli) -> AdwExit {
    let workspace_root = cli
        .root
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let adw_config = match AdwConfig::load(&workspace_root) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return AdwExit::InvalidArgs;
        }
    };

    let kota_config = KotaConfig::for_dir(workspace_root.clone());
    let storage = match Storage::new(&kota_config.db_path).await {
        Ok(storage) => storage,
        Err(e) => {
            error!(db = %kota_config.db_path.display(), error = %e, "cannot open database");
            return AdwExit::MissingEnv;
        }
    };
    if let Err(e) = storage.migrate_embedded().await {
        error!(error = %e, "schema migration failed");
        return AdwExit::MissingEnv;
    }
    let rules = DomainRules::load(&kota_config.domains_path).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring invalid domain rules");
        DomainRules::default()
    });
    let tool_ctx = Arc::new(ToolContext {
        storage: Arc::new(storage),
        config: kota_config,
        rules,
    });

    match cli.command {
        Command::Run { issue, issue_file } | Command::Resume { issue, issue_file } => {
            run_single(tool_ctx, adw_config, workspace_root, issue, issue_file).await
        }
        Command::Batch {
            issues,
            concurrency,
            fail_fast,
        } => {
            if issues.is_empty() {
                error!("batch requires at least one issue");
                return AdwExit::InvalidArgs;
            }
            run_batch_command(
                tool_ctx,
                adw_config,
                workspace_root,
                issues,
                concurrency,
                fail_fast,
            )
            .await
        }
        Command::CleanWorktree { issue, force } => {
            clean_worktree(&adw_config, &workspace_root, issue, force)
        }
    }
}

fn build_orchestrator(
    tool_ctx: Arc<ToolContext>,
    config: AdwConfig,
    workspace_root: PathBuf,
) -> Orchestrator<ClaudeAgent> {
    let agent = ClaudeAgent::new(config.model.clone(), config.phase_timeout_sec);
    let curator = ClaudeAgent::new(config.curator_model.clone(), config.phase_timeout_sec.min(300));
    Orchestrator::new(tool_ctx, config, workspace_root, agent, curator)
}

async fn run_single(
    tool_ctx: Arc<ToolContext>,
    config: AdwConfig,
    workspace_root: PathBuf,
    issue: u64,
    issue_file: Option<PathBuf>,
) -> AdwExit {
    let orchestrator = build_orchestrator(tool_ctx, config, workspace_root);
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, cancelling at next phase boundary");
            cancel.cancel();
        }
    });

    match orchestrator.run_issue(issue, issue_file.as_deref()).await {
        Ok(outcome) => {
            info!(
                issue,
                pr_url = outcome.pr_url.as_deref().unwrap_or("-"),
                cost_usd = outcome.cost_usd,
                duration_ms = outcome.duration_ms,
                "workflow complete"
            );
            AdwExit::Success
        }
        Err(e) => {
            error!(issue, error = %e, "workflow failed");
            e.exit_code()
        }
    }
}

async fn run_batch_command(
    tool_ctx: Arc<ToolContext>,
    config: AdwConfig,
    workspace_root: PathBuf,
    issues: Vec<u64>,
    concurrency: Option<usize>,
    fail_fast: bool,
) -> AdwExit {
    let options = BatchOptions {
        concurrency: concurrency.unwrap_or(config.max_parallel).max(1),
        fail_fast,
    };

    let result = batch::run_batch(&issues, options, move |issue| {
        let tool_ctx = Arc::clone(&tool_ctx);
        let config = config.clone();
        let workspace_root = workspace_root.clone();
        async move {
            let orchestrator = build_orchestrator(tool_ctx, config, workspace_root);
            match orchestrator.run_issue(issue, None).await {
                Ok(outcome) => Ok(IssueSuccess {
                    pr_url: outcome.pr_url,
                    cost_usd: outcome.cost_usd,
                }),
                Err(e) => Err(e.to_string()),
            }
        }
    })
    .await;

    match serde_json::to_string_pretty(&result) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => warn!(error = %e, "cannot render batch result"),
    }

    if result.totals.failure_count == 0 {
        AdwExit::Success
    } else {
        AdwExit::AgentFailed
    }
}

fn clean_worktree(
    config: &AdwConfig,
    workspace_root: &std::path::Path,
    issue: u64,
    force: bool,
) -> AdwExit {
    let store =
        kota_adw::checkpoint::CheckpointStore::new(workspace_root.join(&config.data_dir));
    let checkpoint = match store.load(issue) {
        Ok(Some(checkpoint)) => checkpoint,
        Ok(None) => {
            error!(issue, "no checkpoint for issue");
            return AdwExit::MissingState;
        }
        Err(e) => {
            error!(issue, error = %e, "cannot read checkpoint");
            return AdwExit::FileIo;
        }
    };
    let (Some(path), Some(branch)) = (checkpoint.worktree_path, checkpoint.branch_name) else {
        error!(issue, "checkpoint has no worktree");
        return AdwExit::MissingWorktree;
    };

    let info = kota_adw::worktree::WorktreeInfo {
        path: PathBuf::from(path),
        branch,
    };
    match kota_adw::worktree::remove(workspace_root, &info, force, true) {
        Ok(()) => AdwExit::Success,
        Err(e) => {
            error!(issue, error = %e, "worktree removal failed");
            AdwExit::VcsError
        }
    }
}
