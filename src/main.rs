mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use tailcast::config;
use tailcast::log_buffer::{LogBuffer, LogProvider};
use tailcast::monitor::{find_latest, resolve_recording_directory, FileFilter};
use tailcast::server;
use tailcast_common::config::Config;
use tailcast_common::format::{format_bytes, format_duration};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

async fn start_server(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    dir: Option<PathBuf>,
    log: LogBuffer,
) -> Result<()> {
    // Override config from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(dir) = dir {
        config.recording.directory = Some(dir);
    }

    tracing::info!("Starting tailcast {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let log: Arc<dyn LogProvider> = Arc::new(log);
    server::start(config, Some(log))
        .await
        .context("Server failed")
}

fn show_latest(config: &Config, dir: Option<PathBuf>, json: bool) -> Result<()> {
    let directory = match dir {
        Some(dir) => dir,
        None => {
            let base = std::env::current_dir().context("Failed to read current directory")?;
            resolve_recording_directory(&config.recording, &base)
        }
    };

    let filter = FileFilter::from_config(&config.recording);
    let latest = find_latest(&directory, &filter)
        .with_context(|| format!("Failed to list {:?}", directory))?;

    let Some(latest) = latest else {
        if json {
            println!("null");
        } else {
            println!("No recordings found in {}", directory.display());
        }
        return Ok(());
    };

    let age = SystemTime::now()
        .duration_since(latest.modified)
        .unwrap_or_default();

    if json {
        let value = serde_json::json!({
            "name": latest.name,
            "path": latest.path.display().to_string(),
            "size": latest.len,
            "age_secs": age.as_secs(),
            "stale": age > config.recording.stale_after(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", latest.name);
        println!("  Path: {}", latest.path.display());
        println!("  Size: {}", format_bytes(latest.len));
        println!("  Last modified: {} ago", format_duration(age));
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration loaded with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    println!("  Server: {}:{}", config.server.host, config.server.port);
    match &config.recording.directory {
        Some(dir) => println!("  Recording directory: {}", dir.display()),
        None => println!(
            "  Recording directory: discovered ({}*)",
            config.recording.directory_prefix
        ),
    }
    println!("  Stall timeout: {} ms", config.recording.stall_timeout_ms);
    println!("  Chunk size: {}", format_bytes(config.streaming.chunk_size as u64));
    Ok(())
}

fn init_tracing(verbose: bool, log: &LogBuffer) {
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "tailcast=trace,tailcast_common=debug".to_string()
        } else {
            "tailcast=info,tailcast_common=info".to_string()
        }
    });

    tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(log.clone()),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        // Validate reports on the file itself.
        Commands::Validate { .. } | Commands::Version => Config::default(),
        _ => config::load_config_or_default(cli.config.as_deref())?,
    };

    let log = LogBuffer::new(config.log.buffer_lines);
    init_tracing(cli.verbose, &log);

    match cli.command {
        Commands::Start { host, port, dir } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(config, host, port, dir, log))
        }
        Commands::Latest { dir, json } => show_latest(&config, dir, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("tailcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
