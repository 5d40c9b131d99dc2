use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::IndexError;
use crate::index::SearchResult;
use crate::info_print;

/// Lines of content shown per result
const PREVIEW_LINES: usize = 8;

/// Search an indexed directory
pub async fn search(
    config: &Config,
    query: &str,
    max_results: Option<usize>,
    scores: bool,
    json: bool,
    reindex: bool,
    path: Option<PathBuf>,
) -> Result<()> {
    let root = super::resolve_path(path)?;
    let engine = Engine::open(config).await?;
    let cancel = CancellationToken::new();
    super::cancel_on_ctrl_c(cancel.clone());

    if reindex {
        info_print!("{}", "🔄 Re-indexing before search...".yellow());
        if let Err(e) = engine.index(&cancel, &root).await {
            // Partially built indexes are still searchable
            crate::warn_print!("   ⚠️  {}", e);
        }
    }

    let outcome = match engine.search(&cancel, query, &root, max_results).await {
        Ok(outcome) => outcome,
        Err(IndexError::NotReady(dir)) => {
            println!("{}", "❌ No index found!".red());
            println!("   {} is not indexed", dir.display());
            println!("   Run {} first", "codeindex index".bright_cyan());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    engine.close().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("{}", "🔍 Search Results".bright_cyan().bold());
    println!("{}", "=".repeat(60));
    println!("Query: \"{}\"", query.bright_yellow());
    println!("Found {} results", outcome.results.len());
    if scores {
        println!("   Time: {:?}", outcome.latency);
        for key in ["retrievers_eligible", "retrievers_succeeded", "total_before_dedup"] {
            if let Some(value) = outcome.metadata.get(key) {
                println!("   {}: {}", key.replace('_', " "), value);
            }
        }
        if let Some(errors) = outcome.metadata.get("errors") {
            println!("   {}: {}", "errors".red(), errors);
        }
    }
    println!();

    if outcome.results.is_empty() {
        println!("{}", "No matches found.".dimmed());
        println!("Try:");
        println!("  - Using different keywords");
        println!("  - Making your query more general");
        println!("  - Running {} if the codebase changed", "codeindex index".bright_cyan());
        return Ok(());
    }

    for result in &outcome.results {
        print_result(result, &root, scores);
    }
    Ok(())
}

fn print_result(result: &SearchResult, root: &std::path::Path, show_scores: bool) {
    println!("{}", "─".repeat(60));
    let display_path = std::path::Path::new(&result.file_path)
        .strip_prefix(root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| result.file_path.clone());
    println!("{}", format!("📄 {}:{}", display_path, result.line_number).bright_green());

    let location = format!(
        "   Lines {}-{} • {}",
        result.line_number, result.end_line, result.search_type
    );
    println!("{}", location.dimmed());

    if let Some(symbol) = &result.symbol_info {
        let signature = symbol.signature.as_deref().unwrap_or(&symbol.name);
        println!("   {} {}", symbol.kind.as_str().bright_magenta(), signature.bright_cyan());
    }

    if show_scores {
        let score_text = format!("   Score: {:.3}", result.score);
        let colored = if result.score > 0.8 {
            score_text.green()
        } else if result.score > 0.4 {
            score_text.yellow()
        } else {
            score_text.red()
        };
        println!("{}", colored);
    }

    let lines: Vec<&str> = result.snippet.lines().collect();
    for line in lines.iter().take(PREVIEW_LINES) {
        println!("   │ {}", line.dimmed());
    }
    if lines.len() > PREVIEW_LINES {
        println!("   │ {}", "...".dimmed());
    }
}
