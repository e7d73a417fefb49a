use anyhow::Result;
use std::path::PathBuf;

use codesense::CodeIntelligence;

use super::index_project;

pub async fn show_stats(service: &CodeIntelligence, project: PathBuf, verbose: bool) -> Result<()> {
    let (info, summary) = index_project(service.projects(), &project).await?;
    let stats = service.project_stats(&info.path).unwrap_or_default();

    println!("\nIndex Statistics for {}:", info.path.display());
    println!("  Files: {}", stats.files);
    println!("  Symbols: {}", stats.symbols);
    println!("  Dependencies: {}", stats.dependencies);
    println!("  Files with parse errors: {}", stats.parse_errors);
    println!("  Indexed in: {:.2?}", summary.elapsed);

    if verbose {
        println!("\nDetailed Statistics:");

        if !stats.symbol_kinds.is_empty() {
            println!("  Symbols by kind:");
            for (kind, count) in &stats.symbol_kinds {
                println!("    {}: {}", kind, count);
            }
        }

        if !stats.languages.is_empty() {
            println!("  Languages:");
            for (lang, count) in &stats.languages {
                println!("    {}: {} files", lang, count);
            }
        }

        if summary.skipped + summary.failed > 0 {
            println!("  Skipped: {}, failed: {}", summary.skipped, summary.failed);
        }
    }

    service.shutdown().await;
    Ok(())
}
