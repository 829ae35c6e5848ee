#![doc = include_str!("../README.md")]

/// Configuration options
pub mod config;

/// Workspace context (the services of one open workspace)
pub mod context;

/// Document identity and listing metadata
pub mod document;

/// Error (common error types)
pub mod error;

/// Filesystem abstraction
pub mod fs;

/// Frontmatter parsing and serialization
pub mod frontmatter;

/// Workspace scanning and the backlink graph
pub mod indexer;

/// Wiki-link syntax
pub mod link_parser;

/// Title sanitization and name probing
pub mod path_utils;

/// Search (fuzzy title and tag index)
pub mod search;

/// Document store (create, update, rename, trash)
pub mod store;

/// Commit, push, pull and auto-sync
pub mod sync;

/// Cancellable background tasks
pub mod task;

/// Tree building over a flat listing
pub mod tree;

/// Version control gateway
pub mod vcs;
