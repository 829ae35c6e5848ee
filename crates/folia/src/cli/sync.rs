//! Repository and sync command handlers.

use folia_core::config::Config;
use folia_core::sync::{SyncEvent, SyncReport, SyncStepOutcome};
use folia_core::vcs::{GitCli, VersionControl, is_git_available};

use super::{CliContext, parse_id};

const DEFAULT_COMMIT_MESSAGE: &str = "Update workspace";

/// Create the workspace directory, its repository and the config file
pub async fn handle_init(config: Config, remote_url: Option<&str>) -> bool {
    if !is_git_available() {
        eprintln!("✗ git was not found on PATH");
        return false;
    }

    if let Err(e) = std::fs::create_dir_all(&config.workspace) {
        eprintln!("✗ Could not create {}: {}", config.workspace.display(), e);
        return false;
    }

    let vcs = GitCli::new(config.workspace.clone()).with_branch(&config.branch);
    if let Err(e) = vcs.init().await {
        eprintln!("✗ {}", e);
        return false;
    }
    if let Some(url) = remote_url
        && let Err(e) = vcs.add_remote(&config.remote, url).await
    {
        eprintln!("✗ {}", e);
        return false;
    }

    if let Err(e) = config.save() {
        eprintln!("✗ Could not save config: {}", e);
        return false;
    }

    println!("✓ Workspace ready at {}", config.workspace.display());
    if let Some(path) = Config::config_path() {
        println!("  Config: {}", path.display());
    }
    true
}

pub async fn handle_commit(ctx: &CliContext, message: Option<String>) -> bool {
    let message = message.unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string());
    let author = ctx.config().author();

    match ctx.sync().commit_all(&message, &author).await {
        Ok(Some(commit)) => {
            println!("✓ Committed {}", short(&commit.id));
            true
        }
        Ok(None) => {
            println!("Nothing to commit");
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

pub async fn handle_sync(ctx: &CliContext, open: Option<String>) -> bool {
    let open = match open.as_deref().map(parse_id) {
        Some(None) => return false,
        Some(Some(id)) => Some(id),
        None => None,
    };

    match ctx.sync().sync(open.as_ref()).await {
        Ok(report) => {
            print_report(&report);
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

/// Run auto-sync until Ctrl-C
pub async fn handle_watch(ctx: &CliContext, open: Option<String>) -> bool {
    if let Some(raw) = open {
        let Some(id) = parse_id(&raw) else {
            return false;
        };
        ctx.open_document().set(Some(id));
    }

    if !ctx.start_auto_sync().await {
        eprintln!(
            "✗ Auto-sync is not running: remote '{}' is missing or auto_sync is off",
            ctx.config().remote
        );
        return false;
    }
    let Some(mut events) = ctx.subscribe_sync() else {
        return false;
    };

    println!(
        "Watching {} (every {}s, Ctrl-C to stop)",
        ctx.config().workspace.display(),
        ctx.config().sync_interval().as_secs()
    );
    ctx.trigger_sync();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    log::debug!("Missed {} sync events", n);
                }
                Err(_) => break,
            },
        }
    }

    ctx.stop_auto_sync();
    println!("Stopped");
    true
}

fn print_event(event: &SyncEvent) {
    let now = chrono::Local::now().format("%H:%M:%S");
    match event {
        SyncEvent::Started => log::info!("Sync started"),
        SyncEvent::Succeeded { .. } => println!("[{}] ✓ Synced", now),
        SyncEvent::Failed {
            consecutive_failures,
        } => println!("[{}] ✗ Sync failed ({} in a row)", now, consecutive_failures),
        SyncEvent::RemoteChanged(change) => println!(
            "[{}] ! {} was changed by {} ({})",
            now,
            change.id,
            change.author.name,
            short(&change.new_revision)
        ),
    }
}

fn print_report(report: &SyncReport) {
    match &report.committed {
        Some(commit) => println!("✓ Committed {}", short(&commit.id)),
        None => println!("  Nothing to commit"),
    }
    print_step("Pull", &report.pull);
    print_step("Push", &report.push);
    if let Some(change) = &report.remote_change {
        println!(
            "! {} was changed remotely by {} <{}>",
            change.id, change.author.name, change.author.email
        );
    }
}

fn print_step(name: &str, outcome: &SyncStepOutcome) {
    match outcome {
        SyncStepOutcome::Done => println!("✓ {}", name),
        SyncStepOutcome::NoRemote => println!("  {}: no remote configured", name),
        SyncStepOutcome::Failed(message) => println!("✗ {} failed: {}", name, message),
    }
}

fn short(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}
