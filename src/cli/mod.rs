use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::output::{self, OutputMode};

mod manage;
mod search;

/// Local codebase indexing with hybrid keyword, symbol and semantic retrieval
#[derive(Parser, Debug)]
#[command(name = "codeindex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational output (only show results/errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to ~/.codeindex/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search an indexed directory
    Search {
        /// Search query (e.g., "parseConfig" or "where is the config loaded?")
        query: String,

        /// Maximum total results to return
        #[arg(short = 'm', long)]
        max_results: Option<usize>,

        /// Show relevance scores and retriever counts
        #[arg(long)]
        scores: bool,

        /// Output JSON for agents
        #[arg(long)]
        json: bool,

        /// Rebuild the index before searching
        #[arg(long)]
        reindex: bool,

        /// Path to search in (defaults to current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Index a directory
    Index {
        /// Path to index (defaults to current directory)
        path: Option<PathBuf>,
    },

    /// Show the index status of a directory
    Status {
        /// Path to inspect (defaults to current directory)
        path: Option<PathBuf>,
    },

    /// Remove a directory from every index
    Clear {
        /// Path to clear (defaults to current directory)
        path: Option<PathBuf>,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Keep the index of a directory up to date as files change
    Watch {
        /// Path to watch (defaults to current directory)
        path: Option<PathBuf>,
    },

    /// Show per-index statistics
    Stats,
}

pub async fn run(cli: Cli) -> Result<()> {
    // JSON output must stay machine readable
    let json = matches!(cli.command, Commands::Search { json: true, .. });
    output::set_mode(OutputMode::from_flags(cli.quiet, json));
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Search {
            query,
            max_results,
            scores,
            json,
            reindex,
            path,
        } => search::search(&config, &query, max_results, scores, json, reindex, path).await,
        Commands::Index { path } => manage::index(&config, path).await,
        Commands::Status { path } => manage::status(&config, path).await,
        Commands::Clear { path, yes } => manage::clear(&config, path, yes).await,
        Commands::Watch { path } => manage::watch(&config, path).await,
        Commands::Stats => manage::stats(&config).await,
    }
}

/// Resolve an optional path argument against the current directory
fn resolve_path(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    Ok(path.canonicalize()?)
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_flags() {
        let cli = Cli::parse_from([
            "codeindex", "search", "parseConfig", "-m", "5", "--json", "--path", "/repo",
        ]);
        match cli.command {
            Commands::Search {
                query,
                max_results,
                json,
                path,
                ..
            } => {
                assert_eq!(query, "parseConfig");
                assert_eq!(max_results, Some(5));
                assert!(json);
                assert_eq!(path, Some(PathBuf::from("/repo")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["codeindex", "clear", "-y", "--quiet", "--config", "c.toml"]);
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(cli.command, Commands::Clear { yes: true, path: None }));
    }
}
