use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hostprint::config::Config;
use hostprint::{collect, default_provider, open_token_store, ComponentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Component report followed by the hash
    Text,
    /// Hash only
    Hash,
    /// Components, hash and probe failures as JSON
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "hostprint", version, about = "Print a stable fingerprint of this machine")]
struct Cli {
    /// Configuration file layered over the per-user one
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Component to collect (repeatable); replaces the configured list
    #[arg(short = 'C', long = "component", value_name = "KIND")]
    components: Vec<ComponentKind>,

    /// Sub-key for the stable token
    #[arg(long)]
    token_name: Option<String>,

    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if !cli.components.is_empty() {
        config.components = cli.components;
    }
    if cli.token_name.is_some() {
        config.token.name = cli.token_name;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .with_context(|| format!("Invalid log filter '{}'", config.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("🔍 Collecting {} components", config.components.len());

    let provider = default_provider();
    let store = open_token_store(config.token.store_path.clone());

    let fingerprint = collect(provider.as_ref(), store.as_ref(), &config.components());

    info!(
        "✓ {}/{} components present",
        fingerprint.present_count(),
        fingerprint.len()
    );
    for (name, error) in fingerprint.failures() {
        info!("⊘ {} unavailable: {}", name, error);
    }

    match cli.format {
        Format::Text => {
            print!("{}", fingerprint.render());
            println!("{}", fingerprint.hash());
        }
        Format::Hash => println!("{}", fingerprint.hash()),
        Format::Json => {
            let json = serde_json::to_string_pretty(&fingerprint)
                .context("Failed to serialize fingerprint")?;
            println!("{}", json);
        }
    }

    Ok(())
}
