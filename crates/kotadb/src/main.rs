//! kotadb - entry point for the code-intelligence server binary.

use clap::{Parser, Subcommand};
use kota_core::KotaConfig;
use kotadb::domains::DomainRules;
use kotadb::extract::ExtractOptions;
use kotadb::http::AppState;
use kotadb::storage::Storage;
use kotadb::tools::{ToolContext, Toolset};
use kotadb::RpcServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "kotadb", version, about = "Code-intelligence server")]
struct Cli {
    /// Database file. Defaults to KOTADB_PATH or <cwd>/.kotadb/kota.db.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Working directory to serve. Defaults to KOTADB_CWD or the cwd.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the tool catalog over stdio.
    Serve {
        /// Toolset tier: core, default, memory, or full.
        #[arg(long, default_value = "default")]
        toolset: String,
        /// Also start the localhost HTTP front-end on this port.
        #[arg(long)]
        http_port: Option<u16>,
    },
    /// Index the working tree.
    Index {
        /// Repository name; defaults to local/<directory>.
        #[arg(long)]
        name: Option<String>,
    },
    /// Export changed tables as JSONL.
    Export {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Import a JSONL export directory.
    Import {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> eyre::Result<()> {
    // Stdout carries RPC frames; all logging goes to stderr.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let mut config = match &cli.root {
        Some(root) => KotaConfig::for_dir(root.clone()),
        None => KotaConfig::from_env(),
    };
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    // Database open or migration failure is fatal; nothing can recover it.
    let storage = match Storage::new(&config.db_path).await {
        Ok(storage) => storage,
        Err(e) => {
            error!(db = %config.db_path.display(), error = %e, "cannot open database");
            std::process::exit(1);
        }
    };
    if let Err(e) = storage.migrate_embedded().await {
        error!(error = %e, "schema migration failed");
        std::process::exit(1);
    }

    let rules = match DomainRules::load(&config.domains_path) {
        Ok(rules) => rules,
        Err(e) => {
            warn!(error = %e, "ignoring invalid domain rules");
            DomainRules::default()
        }
    };

    let ctx = Arc::new(ToolContext {
        storage: Arc::new(storage),
        config: config.clone(),
        rules,
    });

    match cli.command {
        Command::Serve { toolset, http_port } => {
            let toolset = Toolset::parse(&toolset)
                .ok_or_else(|| eyre::eyre!("invalid toolset: {toolset}"))?;

            if let Some(port) = http_port {
                let state = Arc::new(AppState {
                    server: tokio::sync::Mutex::new(RpcServer::new(Arc::clone(&ctx), toolset)),
                    allowed_origins: config.allowed_origins.clone(),
                });
                tokio::spawn(async move {
                    if let Err(e) = kotadb::http::start_server(state, port).await {
                        error!(error = %e, "http front-end terminated");
                    }
                });
            }

            RpcServer::new(ctx, toolset).run_stdio().await?;
        }
        Command::Index { name } => {
            let full_name =
                name.unwrap_or_else(|| kotadb::indexer::full_name_for_root(&config.working_dir));
            let options = ExtractOptions {
                max_file_size: config.max_file_size,
                ..ExtractOptions::default()
            };
            let outcome =
                kotadb::indexer::index_full(&ctx.storage, &config.working_dir, &full_name, &options)
                    .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Export { force, dir } => {
            let dir = dir.unwrap_or_else(|| config.export_dir.clone());
            let report = kotadb::sync::export(&ctx.storage, &dir, force).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Import { dir } => {
            let dir = dir.unwrap_or_else(|| config.export_dir.clone());
            let report = kotadb::sync::import(&ctx.storage, &dir).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
