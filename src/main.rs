use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use codesense::config::{Config, LoggingConfig};
use codesense::CodeIntelligence;

mod cli;

use cli::OutputFormat;

#[derive(Parser)]
#[command(name = "codesense")]
#[command(author = "Intent Project Team")]
#[command(version = "0.1.0")]
#[command(about = "Incremental code symbol index with watch-driven updates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./.codesense.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract symbols and dependencies from one file
    Analyze {
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Index projects and search their symbols
    Search {
        query: String,

        /// Project directory (repeatable, defaults to the current directory)
        #[arg(short, long)]
        project: Vec<PathBuf>,

        /// Restrict to a symbol kind (repeatable)
        #[arg(short, long)]
        kind: Vec<String>,

        /// Restrict to a language such as python or typescript (repeatable)
        #[arg(long)]
        language: Vec<String>,

        /// Maximum number of results (0 for unlimited)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Watch projects and keep their index up to date until Ctrl+C
    Watch {
        /// Project directories
        dirs: Vec<PathBuf>,
    },

    /// Show index statistics
    Stats {
        /// Project directory
        #[arg(default_value = ".")]
        project: PathBuf,
    },

    /// List supported languages
    Languages,
}

fn init_logging(config: &LoggingConfig, debug: bool, verbose: bool) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config.level.as_str()
    };

    // RUST_LOG wins over flags and config
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match config.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.pretty().init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::from_dir(".")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config.logging, cli.debug, cli.verbose);

    info!("codesense v0.1.0 starting...");

    let service = CodeIntelligence::new(config)?;

    match cli.command {
        Commands::Analyze { file, format } => {
            cli::analyze::analyze_file(&service, file, format).await?;
        }

        Commands::Search {
            query,
            project,
            kind,
            language,
            limit,
            format,
        } => {
            cli::search::search_symbols(&service, query, project, kind, language, limit, format).await?;
        }

        Commands::Watch { dirs } => {
            cli::watch::watch_projects(&service, dirs).await?;
        }

        Commands::Stats { project } => {
            cli::stats::show_stats(&service, project, cli.verbose).await?;
        }

        Commands::Languages => {
            cli::languages::list_languages(&service);
        }
    }

    Ok(())
}
