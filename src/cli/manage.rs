use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::IndexError;
use crate::index::{IndexManager, IndexStatus};
use crate::{info_print, warn_print};

/// Index a directory with a live file counter
pub async fn index(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let root = super::resolve_path(path)?;
    let engine = Engine::open(config).await?;
    let cancel = CancellationToken::new();
    super::cancel_on_ctrl_c(cancel.clone());

    info_print!("{}", "🚀 Indexing".bright_cyan().bold());
    info_print!("{}", "=".repeat(60));
    info_print!("📂 Path: {}", root.display());

    let start = Instant::now();
    let (pb, progress) = spawn_progress(Arc::clone(engine.manager()), root.clone());
    let outcome = engine.index(&cancel, &root).await;
    progress.abort();
    pb.finish_and_clear();
    engine.close().await?;

    match outcome {
        Ok(status) => {
            info_print!(
                "\n✅ Indexed {} files ({:.2} MB) in {:?}",
                status.indexed_files,
                status.total_size as f64 / (1024.0 * 1024.0),
                start.elapsed()
            );
            print_versions(&status);
            Ok(())
        }
        Err(IndexError::Cancelled) => {
            warn_print!("{}", "Indexing cancelled.".yellow());
            Ok(())
        }
        Err(e) => {
            println!("\n{}", "⚠️  Indexing finished with errors".yellow());
            if let Ok(status) = engine.manager().get_index_status(&root).await {
                println!("   Indexed {}/{} files", status.indexed_files, status.total_files);
            }
            Err(e.into())
        }
    }
}

/// Poll the build status into a spinner until aborted
fn spawn_progress(manager: Arc<IndexManager>, root: PathBuf) -> (ProgressBar, tokio::task::JoinHandle<()>) {
    let pb = if crate::output::is_quiet() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    if let Ok(style) = ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));

    let ticker = pb.clone();
    let handle = tokio::spawn(async move {
        loop {
            if let Ok(status) = manager.get_index_status(&root).await {
                ticker.set_message(format!("{} files discovered", status.total_files));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });
    (pb, handle)
}

fn print_versions(status: &IndexStatus) {
    for (name, version) in &status.index_versions {
        info_print!("   {} {}", name.bright_green(), version.dimmed());
    }
}

pub async fn status(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let root = super::resolve_path(path)?;
    let engine = Engine::open(config).await?;

    let status = match engine.manager().get_index_status(&root).await {
        Ok(status) => status,
        Err(IndexError::NotFound(_)) => {
            println!("{}", "❌ Not indexed".red());
            println!("   Run {} first", "codeindex index".bright_cyan());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", "📊 Index Status".bright_cyan().bold());
    println!("{}", "=".repeat(60));
    println!("📂 {}", status.working_directory.display());
    let state = if status.is_building {
        "building".yellow()
    } else if status.is_ready {
        "ready".green()
    } else if status.is_failed() {
        "failed".red()
    } else {
        "incomplete".yellow()
    };
    println!("   State: {}", state);
    println!("   Files: {}/{} ({:.0}%)", status.indexed_files, status.total_files, status.progress() * 100.0);
    println!("   Size: {:.2} MB", status.total_size as f64 / (1024.0 * 1024.0));
    println!("   Updated: {}", status.last_updated.to_rfc3339());
    print_versions(&status);
    for error in &status.errors {
        println!("   {} {}", "error:".red(), error);
    }
    Ok(())
}

pub async fn clear(config: &Config, path: Option<PathBuf>, yes: bool) -> Result<()> {
    let root = super::resolve_path(path)?;
    let engine = Engine::open(config).await?;

    println!("{}", "🗑️  Clear Index".bright_yellow().bold());
    println!("{}", "=".repeat(60));
    println!("📂 {}", root.display());

    if !yes {
        println!("\n{}", "⚠️  This will delete all indexed data for this directory!".yellow());
        print!("Are you sure? (y/N): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", "Cancelled.".dimmed());
            return Ok(());
        }
    }

    engine.manager().clear_index(&CancellationToken::new(), &root).await?;
    engine.close().await?;
    println!("{}", "✅ Index cleared".green());
    Ok(())
}

pub async fn watch(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let root = super::resolve_path(path)?;
    let engine = Engine::open(config).await?;
    let cancel = CancellationToken::new();
    super::cancel_on_ctrl_c(cancel.clone());

    if !engine.manager().is_index_ready(&root).await {
        info_print!("{}", "Index not ready, building first...".yellow());
        engine.index(&cancel, &root).await?;
    }

    info_print!("👀 Watching {} (Ctrl-C to stop)", root.display().to_string().bright_cyan());
    engine.watcher().watch(&cancel, &root).await?;
    engine.close().await?;
    Ok(())
}

pub async fn stats(config: &Config) -> Result<()> {
    let engine = Engine::open(config).await?;
    let stats = engine.manager().stats().await?;

    println!("{}", "📊 Index Statistics".bright_cyan().bold());
    println!("{}", "=".repeat(60));
    println!("💾 Data dir: {}", config.data_dir.display());
    for index in &stats {
        println!("\n{} {}", index.name.bright_green(), index.version.dimmed());
        println!("   Documents: {}", index.documents);
        println!("   Files: {}", index.files);
        println!("   Working directories: {}", index.working_directories);
    }

    let dirs = engine.manager().working_directories().await;
    if !dirs.is_empty() {
        println!("\n{}", "Indexed directories:".bright_green());
        for dir in dirs {
            let ready = engine.manager().is_index_ready(&dir).await;
            println!("   {} {}", if ready { "✅" } else { "⚠️ " }, dir.display());
        }
    }

    let mut total_size = 0u64;
    for sub in ["fts", "symbols", "embeddings"] {
        let dir = config.data_dir.join(sub);
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                total_size += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
    }
    println!("\n{}", "Storage:".bright_green());
    println!("   On disk: {:.2} MB", total_size as f64 / (1024.0 * 1024.0));
    engine.close().await?;
    Ok(())
}
