/// Clap argument definitions
mod args;

/// Page and folder commands
mod document;

/// `init`, `commit`, `sync` and `watch`
mod sync;

use std::path::PathBuf;

use clap::Parser;

use folia_core::config::Config;
use folia_core::context::WorkspaceContext;
use folia_core::document::DocumentId;
use folia_core::fs::{RealFileSystem, SyncToAsyncFs};
use folia_core::vcs::GitCli;

pub use args::Cli;
use args::Commands;

/// Async filesystem used throughout the CLI.
pub type AsyncFs = SyncToAsyncFs<RealFileSystem>;

/// Workspace services as the CLI opens them.
pub type CliContext = WorkspaceContext<AsyncFs, GitCli>;

/// Main entry point for the CLI
pub fn run_cli() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("✗ Could not start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if !runtime.block_on(dispatch(cli)) {
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

async fn dispatch(cli: Cli) -> bool {
    let config = load_config(cli.workspace);

    if let Commands::Init { remote } = &cli.command {
        return sync::handle_init(config, remote.as_deref()).await;
    }

    let Some(ctx) = open_context(config).await else {
        return false;
    };

    let success = match cli.command {
        Commands::Init { .. } => true,
        Commands::New { title, parent } => document::handle_new(&ctx, &title, parent).await,
        Commands::Show { id } => document::handle_show(&ctx, &id).await,
        Commands::List { json } => document::handle_list(&ctx, json).await,
        Commands::Tree { tag } => document::handle_tree(&ctx, tag).await,
        Commands::Backlinks { id } => document::handle_backlinks(&ctx, &id).await,
        Commands::Search { query, limit } => document::handle_search(&ctx, &query, limit).await,
        Commands::Rename { id, title } => document::handle_rename(&ctx, &id, &title).await,
        Commands::Rm { id } => document::handle_rm(&ctx, &id).await,
        Commands::RenameFolder { id, name } => {
            document::handle_rename_folder(&ctx, &id, &name).await
        }
        Commands::RmFolder { id } => document::handle_rm_folder(&ctx, &id).await,
        Commands::Trash { command } => document::handle_trash(&ctx, command).await,
        Commands::Commit { message } => sync::handle_commit(&ctx, message).await,
        Commands::Sync { open } => sync::handle_sync(&ctx, open).await,
        Commands::Watch { open } => sync::handle_watch(&ctx, open).await,
    };

    ctx.close();
    success
}

/// Config from the default location, with `--workspace` taking precedence
fn load_config(workspace: Option<PathBuf>) -> Config {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("⚠ Could not read config, using defaults: {}", e);
            Config::default()
        }
    };
    if let Some(workspace) = workspace {
        config.workspace = workspace;
    }
    config
}

async fn open_context(config: Config) -> Option<CliContext> {
    let vcs = GitCli::new(config.workspace.clone()).with_branch(&config.branch);
    match WorkspaceContext::open(config, SyncToAsyncFs::new(RealFileSystem), vcs).await {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("✗ {}", e);
            eprintln!("  Run `folia init` to create a workspace.");
            None
        }
    }
}

/// Parse a user-supplied id, reporting errors
fn parse_id(raw: &str) -> Option<DocumentId> {
    match DocumentId::parse(raw) {
        Ok(id) => Some(id),
        Err(e) => {
            eprintln!("✗ {}", e);
            None
        }
    }
}
