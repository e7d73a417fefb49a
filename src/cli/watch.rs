use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use codesense::CodeIntelligence;

use super::index_project;

/// Watch each directory until Ctrl-C
pub async fn watch_projects(service: &CodeIntelligence, dirs: Vec<PathBuf>) -> Result<()> {
    let dirs = if dirs.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        dirs
    };

    for dir in &dirs {
        index_project(service.projects(), dir).await?;
    }

    let status = service.list_projects().watch_status;
    println!(
        "Watching {} project(s), {} files cached. Press Ctrl+C to stop.",
        status.watched_count, status.cached_file_count
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Shutting down");
    service.shutdown().await;
    Ok(())
}
