//! CLI entrypoint for Crowdspace.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crowdspace_core::{Crowdspace, CrowdspaceConfig, ReembedEvent};
use store::{Platform, ProjectFilter, Status};

#[derive(Parser)]
#[command(name = "crowdspace")]
#[command(about = "Crowdspace: crowdfunding project directory with semantic search", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to the standard search locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Listen address, overriding the config
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Search projects by meaning
    Search {
        query: String,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        platform: Option<Platform>,
        #[arg(long)]
        category: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute the embedding of every project
    Reembed {
        /// Pause between provider calls, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Show store and embedding status
    Status,
    /// Write a commented default config file
    InitConfig {
        /// Destination (defaults to the platform config directory)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn open(config_path: Option<&Path>) -> Result<(CrowdspaceConfig, Crowdspace)> {
    let config = match config_path {
        Some(path) => CrowdspaceConfig::load_from(path)?.with_env_overrides(),
        None => CrowdspaceConfig::load()?,
    };
    let app = Crowdspace::open(&config)?;
    Ok((config, app))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { addr } => {
            let (config, app) = open(config_path)?;
            let addr = match addr {
                Some(addr) => addr,
                None => config
                    .server
                    .addr
                    .parse()
                    .with_context(|| format!("Invalid server address '{}'", config.server.addr))?,
            };
            api::serve(app, addr).await?;
        }
        Commands::Search { query, status, platform, category, json } => {
            let (_, app) = open(config_path)?;
            let filter = ProjectFilter { status, platform, category };
            let results = app.search.search(&query, &filter).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("search: {} result(s) for '{}'", results.len(), query.trim());
                for (rank, hit) in results.iter().enumerate() {
                    let project = &hit.item;
                    println!(
                        "{:>2}. [{:.3}] {} by {} ({}, {})",
                        rank + 1,
                        hit.score,
                        project.title,
                        project.creator_name,
                        project.platform,
                        project.status
                    );
                    println!("    {}", project.url);
                }
            }
        }
        Commands::Reembed { delay_ms } => {
            let (config, app) = open(config_path)?;
            let delay = delay_ms.map(Duration::from_millis).unwrap_or_else(|| config.reembed_delay());
            let report = app
                .directory
                .reembed_all_with_progress(delay, |event| match event {
                    ReembedEvent::Started(total) => eprintln!("re-embedding {} project(s)", total),
                    ReembedEvent::Updated(id, dims) => eprintln!("  [{}] updated ({} dimensions)", id, dims),
                    ReembedEvent::Failed(id, err) => eprintln!("  [{}] failed: {}", id, err),
                    ReembedEvent::Done => {}
                })
                .await?;
            println!("done: {} updated, {} failed", report.updated, report.failed);
        }
        Commands::Status => {
            let (config, app) = open(config_path)?;
            let projects = app.store.project_count()?;
            let embedded = app.store.embedded_count()?;
            let source = config_path.map(Path::to_path_buf).or_else(CrowdspaceConfig::find_config_file);

            match source {
                Some(path) => println!("config: {}", path.display()),
                None => println!("config: (defaults)"),
            }
            println!("data dir: {}", config.data_dir().display());
            println!("model: {}", config.embedding.model);
            println!(
                "api key: {}",
                if config.embedding.api_key.is_some() { "set" } else { "not set (GOOGLE_API_KEY)" }
            );
            println!("projects: {}", projects);
            println!("embedded: {}/{}", embedded, projects);
        }
        Commands::InitConfig { output, force } => init_config(output, force)?,
    }
    Ok(())
}

fn init_config(output: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match output.or_else(CrowdspaceConfig::default_config_path) {
        Some(path) => path,
        None => bail!("Could not determine a config directory; pass --output"),
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, CrowdspaceConfig::generate_default_config())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
