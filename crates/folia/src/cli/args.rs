use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// A local-first knowledge base of markdown pages versioned with git
#[derive(Parser, Debug)]
#[command(name = "folia", version, about)]
pub struct Cli {
    /// Workspace directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the workspace directory, its repository and the config file
    Init {
        /// Remote URL to add as `origin`
        #[arg(long)]
        remote: Option<String>,
    },

    /// Create a new empty page
    New {
        title: String,

        /// Folder id to create the page in
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Print a page (or describe a folder)
    Show { id: String },

    /// List every page and folder
    List {
        /// Print JSON instead of one id per line
        #[arg(long)]
        json: bool,
    },

    /// Print the workspace tree
    Tree {
        /// Only entries carrying this tag, with their ancestors
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Pages linking to a page
    Backlinks { id: String },

    /// Fuzzy search over titles and tags
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Rename a page
    Rename { id: String, title: String },

    /// Move a page to the trash
    Rm { id: String },

    /// Rename a folder
    RenameFolder { id: String, name: String },

    /// Move every page of a folder to the trash and remove the folder
    RmFolder { id: String },

    /// List or restore trashed pages
    Trash {
        #[command(subcommand)]
        command: Option<TrashCommand>,
    },

    /// Commit every change in the workspace
    Commit {
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Commit, pull and push once
    Sync {
        /// Page currently open; reported if the pull changed it
        #[arg(long)]
        open: Option<String>,
    },

    /// Run auto-sync until interrupted
    Watch {
        #[arg(long)]
        open: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TrashCommand {
    /// Move a trashed page back to where it was
    Restore { name: String },
}
