use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use etl_mcp::config::Config;
use tracing::{info, warn};

/// ETL MCP Server
#[derive(Debug, Parser)]
#[command(name = "etl-mcp-server", version, about)]
struct Cli {
    /// Path to the configuration file (YAML, or JSON for `.json` files).
    #[arg(short, long, env = "ETL_MCP_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, load_error) = Config::load_or_default(&cli.config);
    etl_mcp::telemetry::init(config.mcp.debug)?;

    info!("Starting ETL MCP Server...");
    info!(path = %cli.config.display(), "using config file");
    if let Some(err) = load_error {
        warn!(error = %err, "falling back to default configuration");
    }

    let server = etl_mcp::run(config)?;
    info!(tools = server.len(), "server initialised");
    Ok(())
}
