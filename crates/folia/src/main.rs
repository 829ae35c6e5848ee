#![doc = include_str!("../README.md")]

/// CLI module - command-line interface for folia
mod cli;

fn main() {
    cli::run_cli();
}
