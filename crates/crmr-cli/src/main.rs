use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crmr_core::{schema_for, DataSource, ReportConfigRequest};
use crmr_engine::EngineConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "crmr-cli")]
#[command(about = "CRM report engine command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a report config read from a JSON file
    Run {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Run a named template
    Template {
        id: String,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Validate a report config without running it
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// List report templates
    Templates,
    /// List data sources and their columns
    Sources,
    /// Serve the HTTP API
    Serve,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_config(path: &Path) -> Result<ReportConfigRequest> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serializing output")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match cli.command {
        Commands::Run { config: path, tenant } => {
            let request = read_config(&path)?;
            let engine = crmr_engine::engine_from_config(&config).await?;
            let run = engine.execute_report(&request, tenant.as_deref()).await?;
            print_json(&run)?;
        }
        Commands::Template { id, tenant } => {
            let engine = crmr_engine::engine_from_config(&config).await?;
            let run = engine.run_template(&id, tenant.as_deref()).await?;
            print_json(&run)?;
        }
        Commands::Validate { config: path } => {
            let normalized = read_config(&path)?.validate()?;
            print_json(&normalized)?;
        }
        Commands::Templates => {
            let engine = crmr_engine::engine_from_config(&config).await?;
            for template in engine.templates().list() {
                println!(
                    "{:<28} {:<10} {}",
                    template.id,
                    template.config.data_source,
                    template.name
                );
            }
        }
        Commands::Sources => {
            for data_source in DataSource::ALL {
                let columns = schema_for(data_source)
                    .columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{data_source}: {columns}");
            }
        }
        Commands::Serve => {
            crmr_web::serve(&config).await?;
        }
    }

    Ok(())
}
