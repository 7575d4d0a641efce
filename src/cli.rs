use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tailcast")]
#[command(author, version, about = "Stream the newest recording while it is still being written")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Monitor the recording directory and serve it over HTTP
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Recording directory (skips discovery)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show the file that would be streamed right now
    Latest {
        /// Recording directory (skips discovery)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_overrides_are_optional() {
        let cli = Cli::try_parse_from(["tailcast", "start"]).unwrap();
        match cli.command {
            Commands::Start { host, port, dir } => {
                assert!(host.is_none());
                assert!(port.is_none());
                assert!(dir.is_none());
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["tailcast", "latest", "--json", "-v", "-c", "x.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Latest { json: true, dir: None }));
    }

    #[test]
    fn start_with_port_and_dir() {
        let cli = Cli::try_parse_from(["tailcast", "start", "-p", "9000", "-d", "/rec"]).unwrap();
        match cli.command {
            Commands::Start { port, dir, .. } => {
                assert_eq!(port, Some(9000));
                assert_eq!(dir, Some(PathBuf::from("/rec")));
            }
            _ => panic!("expected start"),
        }
    }
}
