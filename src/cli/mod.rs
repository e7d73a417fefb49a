// CLI command implementations

pub mod analyze;
pub mod languages;
pub mod search;
pub mod stats;
pub mod watch;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};

use codesense::project::ProjectManager;
use codesense::indexer::IndexSummary;
use codesense::index::ProjectInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Spinner on stderr while a long step runs
pub fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Add `dir` as a project behind a spinner
pub async fn index_project(projects: &ProjectManager, dir: &Path) -> Result<(ProjectInfo, IndexSummary)> {
    let pb = spinner(format!("Indexing {}", dir.display()));
    let result = projects
        .add_project(dir, None)
        .await
        .with_context(|| format!("Failed to index {}", dir.display()));

    match &result {
        Ok((info, summary)) => pb.finish_with_message(format!(
            "Indexed {}: {} files, {} symbols",
            info.name, summary.indexed, summary.symbols
        )),
        Err(_) => pb.abandon(),
    }
    result
}
