use anyhow::{anyhow, Result};
use std::path::PathBuf;

use codesense::{CodeIntelligence, SymbolKind};

use super::{index_project, OutputFormat};

pub async fn search_symbols(
    service: &CodeIntelligence,
    query: String,
    projects: Vec<PathBuf>,
    kinds: Vec<String>,
    languages: Vec<String>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let kinds = kinds
        .iter()
        .map(|kind| kind.parse::<SymbolKind>().map_err(|e| anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;

    let known = service.registry().languages();
    if let Some(unknown) = languages
        .iter()
        .find(|language| !known.iter().any(|info| info.name.eq_ignore_ascii_case(language)))
    {
        return Err(anyhow!("Unknown language: {}", unknown));
    }

    let projects = if projects.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        projects
    };
    for project in &projects {
        index_project(service.projects(), project).await?;
    }

    let hits = service.search_symbols(&query, None, &kinds, &languages, limit);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hits)?),
        OutputFormat::Text => {
            if hits.is_empty() {
                println!("No symbols matching '{}'", query);
            } else {
                println!("Found {} symbols:", hits.len());
                for hit in &hits {
                    println!(
                        "  {:.1}  {}:{}  {} ({}, {})",
                        hit.score,
                        hit.symbol.file_path.display(),
                        hit.symbol.line_start,
                        hit.symbol.name,
                        hit.symbol.kind,
                        hit.symbol.language
                    );
                }
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
