//! Page and folder command handlers.
//!
//! Each handler returns `true` on success and prints its own errors.

use folia_core::document::Entry;
use folia_core::tree::{build_tree, filter_by_tag, format_tree};

use super::args::TrashCommand;
use super::{CliContext, parse_id};

pub async fn handle_new(ctx: &CliContext, title: &str, parent: Option<String>) -> bool {
    let parent = match parent.as_deref().map(parse_id) {
        Some(None) => return false,
        Some(Some(id)) => Some(id),
        None => None,
    };

    match ctx.store().create(title, parent.as_ref()).await {
        Ok(id) => {
            println!("✓ Created {}", id);
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

pub async fn handle_show(ctx: &CliContext, raw: &str) -> bool {
    let Some(id) = parse_id(raw) else {
        return false;
    };

    match ctx.store().get(&id).await {
        Ok(Entry::Document(doc)) => {
            println!("# {}", doc.title());
            if !doc.meta.tags.is_empty() {
                println!("tags: {}", doc.meta.tags.join(", "));
            }
            println!();
            print!("{}", doc.body);
            true
        }
        Ok(Entry::Folder(meta)) => {
            if !ctx.store().folder_exists(&id).await {
                eprintln!("✗ No page or folder named '{}'", id);
                return false;
            }
            println!("{}/ (folder)", meta.title);
            match ctx.indexer().list_all(ctx.cancellation_token()).await {
                Ok(metas) => {
                    for child in metas.iter().filter(|m| m.parent.as_ref() == Some(&id)) {
                        println!("  {}", child.title);
                    }
                    true
                }
                Err(e) => {
                    eprintln!("✗ {}", e);
                    false
                }
            }
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

pub async fn handle_list(ctx: &CliContext, json: bool) -> bool {
    let metas = match ctx.indexer().list_all(ctx.cancellation_token()).await {
        Ok(metas) => metas,
        Err(e) => {
            eprintln!("✗ {}", e);
            return false;
        }
    };

    if json {
        match serde_json::to_string_pretty(&metas) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("✗ {}", e);
                return false;
            }
        }
    } else {
        for meta in &metas {
            let marker = if meta.is_folder() { "/" } else { "" };
            println!("{}{}", meta.id, marker);
        }
    }
    true
}

pub async fn handle_tree(ctx: &CliContext, tag: Option<String>) -> bool {
    let metas = match ctx.indexer().list_all(ctx.cancellation_token()).await {
        Ok(metas) => metas,
        Err(e) => {
            eprintln!("✗ {}", e);
            return false;
        }
    };

    let metas = match &tag {
        Some(tag) => filter_by_tag(&metas, tag),
        None => metas,
    };
    if metas.is_empty() {
        println!("(empty)");
    } else {
        print!("{}", format_tree(&build_tree(&metas)));
    }
    true
}

pub async fn handle_backlinks(ctx: &CliContext, raw: &str) -> bool {
    let Some(id) = parse_id(raw) else {
        return false;
    };

    match ctx.indexer().build_backlink_index(ctx.cancellation_token()).await {
        Ok(index) => {
            match index.get(&id) {
                Some(sources) => {
                    for source in sources {
                        println!("{}", source);
                    }
                }
                None => println!("No pages link to {}", id),
            }
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

pub async fn handle_search(ctx: &CliContext, query: &str, limit: Option<usize>) -> bool {
    if let Err(e) = ctx.refresh().await {
        eprintln!("✗ {}", e);
        return false;
    }

    let results = ctx.search(query).await;
    if results.is_empty() {
        println!("No matches for '{}'", query);
        return true;
    }
    for result in results.iter().take(limit.unwrap_or(usize::MAX)) {
        println!("{:>6.2}  {}", result.score, result.id);
    }
    true
}

pub async fn handle_rename(ctx: &CliContext, raw: &str, title: &str) -> bool {
    let Some(id) = parse_id(raw) else {
        return false;
    };

    match ctx.store().rename(&id, title).await {
        Ok(new_id) if new_id == id => {
            println!("Name unchanged: {}", id);
            true
        }
        Ok(new_id) => {
            println!("✓ Renamed {} → {}", id, new_id);
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

pub async fn handle_rm(ctx: &CliContext, raw: &str) -> bool {
    let Some(id) = parse_id(raw) else {
        return false;
    };

    match ctx.store().delete(&id).await {
        Ok(name) => {
            println!("✓ Moved {} to trash as {}", id, name);
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

pub async fn handle_rename_folder(ctx: &CliContext, raw: &str, name: &str) -> bool {
    let Some(id) = parse_id(raw) else {
        return false;
    };

    match ctx.store().rename_folder(&id, name).await {
        Ok(new_id) => {
            println!("✓ Renamed folder {} → {}", id, new_id);
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

pub async fn handle_rm_folder(ctx: &CliContext, raw: &str) -> bool {
    let Some(id) = parse_id(raw) else {
        return false;
    };

    match ctx.store().delete_folder(&id).await {
        Ok(report) => {
            println!("✓ Moved {} page(s) to trash", report.trashed.len());
            for (failed, reason) in &report.failed {
                eprintln!("  ✗ {}: {}", failed, reason);
            }
            if !report.removed_dir {
                eprintln!("  ⚠ Folder {} was not removed", id);
            }
            report.failed.is_empty()
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}

pub async fn handle_trash(ctx: &CliContext, command: Option<TrashCommand>) -> bool {
    match command {
        Some(TrashCommand::Restore { name }) => match ctx.store().restore(&name).await {
            Ok(id) => {
                println!("✓ Restored {}", id);
                true
            }
            Err(e) => {
                eprintln!("✗ {}", e);
                false
            }
        },
        None => match ctx.store().list_trash().await {
            Ok(entries) if entries.is_empty() => {
                println!("Trash is empty");
                true
            }
            Ok(entries) => {
                for entry in entries {
                    println!("{}  (was {})", entry.name, entry.original_id);
                }
                true
            }
            Err(e) => {
                eprintln!("✗ {}", e);
                false
            }
        },
    }
}
