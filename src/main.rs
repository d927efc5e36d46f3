// src/main.rs
// Astro MCP - astronomical data services over the Model Context Protocol

use anyhow::{Context, Result};
use astro_mcp::app::build_executor;
use astro_mcp::config::{AstroConfig, EnvOverrides, load_dotenv};
use astro_mcp::mcp::AstroServer;
use astro_mcp::registry::catalog;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "astro-mcp")]
#[command(about = "Uniform access to astronomical data services")]
#[command(version)]
struct Cli {
    /// Config file (default: $ASTRO_MCP_CONFIG or ~/.astro-mcp/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as MCP server over stdio (default)
    Serve,

    /// List services and their availability
    Services,

    /// List callable functions
    Functions {
        /// Restrict to one module
        module: Option<String>,
    },

    /// Show documentation for one function
    Info { module: String, function: String },

    /// Execute a function and print the result envelope
    Exec {
        module: String,
        function: String,
        /// Keyword arguments as a JSON object
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Show which API tokens are configured
    Auth,
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_params(params: Option<&str>) -> Result<Map<String, Value>> {
    match params {
        None => Ok(Map::new()),
        Some(text) => match serde_json::from_str::<Value>(text).context("--params must be JSON")? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("--params must be a JSON object, got {}", other),
        },
    }
}

async fn run_mcp_server(config: AstroConfig) -> Result<()> {
    let executor = build_executor(config);
    info!(
        services = executor.registry().entries().len(),
        "Starting MCP server on stdio"
    );
    let server = AstroServer::new(executor);

    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;
    service.waiting().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        match &cli.command {
            Some(Commands::Serve) | None => Level::INFO,
            Some(_) => Level::WARN,
        }
    };

    // stdout carries the MCP transport
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    load_dotenv();
    let mut config = AstroConfig::load(cli.config.as_deref())?;
    EnvOverrides::from_env().apply(&mut config);

    match cli.command {
        Some(Commands::Serve) | None => run_mcp_server(config).await?,
        Some(Commands::Services) => {
            let executor = build_executor(config);
            print_json(&catalog::list_modules(executor.registry()))?;
        }
        Some(Commands::Functions { module }) => {
            let executor = build_executor(config);
            print_json(&catalog::list_functions(executor.registry(), module.as_deref()))?;
        }
        Some(Commands::Info { module, function }) => {
            let executor = build_executor(config);
            print_json(&catalog::get_function_info(executor.registry(), &module, &function))?;
        }
        Some(Commands::Exec {
            module,
            function,
            params,
        }) => {
            let params = parse_params(params.as_deref())?;
            let executor = build_executor(config);
            match executor.execute(&module, &function, params).await {
                Ok(envelope) => print_json(&envelope)?,
                Err(e) => {
                    print_json(&e.to_value())?;
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Auth) => {
            let executor = build_executor(config);
            let status = executor.registry().context().credentials.status();
            print_json(&json!({ "services": status }))?;
        }
    }

    Ok(())
}
