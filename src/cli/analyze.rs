use anyhow::Result;
use std::path::PathBuf;

use codesense::{CodeIntelligence, FileAnalysis};

use super::OutputFormat;

pub async fn analyze_file(service: &CodeIntelligence, file: PathBuf, format: OutputFormat) -> Result<()> {
    let analysis = service.analyze_file(&file).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&analysis)?),
        OutputFormat::Text => print_analysis(&analysis),
    }

    Ok(())
}

fn print_analysis(analysis: &FileAnalysis) {
    println!("{} ({})", analysis.path.display(), analysis.language);

    if let Some(error) = &analysis.parse_error {
        println!("\nParse error: {}", error);
    }

    println!("\nSymbols ({}):", analysis.symbols.len());
    for symbol in &analysis.symbols {
        let owner = symbol
            .parent
            .as_deref()
            .map(|parent| format!(" in {}", parent))
            .unwrap_or_default();
        println!(
            "  {:>4}:{:<3} {:<9} {}{}",
            symbol.line_start, symbol.column_start, symbol.kind, symbol.signature, owner
        );
    }

    println!("\nDependencies ({}):", analysis.dependencies.len());
    for dep in &analysis.dependencies {
        let alias = if dep.alias != dep.target {
            format!(" as {}", dep.alias)
        } else {
            String::new()
        };
        println!(
            "  {:>4}  {:<14} {}{}{}",
            dep.line,
            dep.kind.as_str(),
            dep.target,
            alias,
            if dep.is_relative { " (relative)" } else { "" }
        );
    }
}
