//! devonthink-mcp - MCP server for DEVONthink configuration files
//!
//! Serves smart groups, smart rules, column layouts and email headers to
//! MCP clients over stdio.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use devonthink_mcp::{Config, McpServer};

/// MCP server for DEVONthink configuration files.
#[derive(Parser, Debug)]
#[command(name = "devonthink-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SmartGroups.plist location.
    #[arg(long, env = "DEVONTHINK_SMART_GROUPS")]
    smart_groups: Option<PathBuf>,

    /// SmartRules.plist location.
    #[arg(long, env = "DEVONTHINK_SMART_RULES")]
    smart_rules: Option<PathBuf>,

    /// Preferences plist holding the column layouts.
    #[arg(long, env = "DEVONTHINK_PREFERENCES")]
    preferences: Option<PathBuf>,

    /// Timeout for each external command, in seconds.
    #[arg(long, default_value_t = 15)]
    command_timeout_secs: u64,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn config(&self) -> anyhow::Result<Config> {
        anyhow::ensure!(
            self.command_timeout_secs > 0,
            "--command-timeout-secs must be at least 1"
        );

        let mut config = Config::detect();
        if let Some(path) = &self.smart_groups {
            config.paths.smart_groups = path.clone();
        }
        if let Some(path) = &self.smart_rules {
            config.paths.smart_rules = path.clone();
        }
        if let Some(path) = &self.preferences {
            config.paths.preferences = path.clone();
        }
        config.limits.timeout = Duration::from_secs(self.command_timeout_secs);
        Ok(config)
    }
}

fn init_logging(args: &Args) {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Log to stderr (not stdout, which is used for MCP protocol)
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    tracing::info!(
        "Starting {} v{}",
        devonthink_mcp::server::SERVER_NAME,
        devonthink_mcp::server::SERVER_VERSION
    );

    let config = match args.config().context("invalid configuration") {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        smart_groups = %config.paths.smart_groups.display(),
        smart_rules = %config.paths.smart_rules.display(),
        preferences = %config.paths.preferences.display(),
        "Using DEVONthink files"
    );

    let server = McpServer::new(&config);
    match server.run_stdio().await {
        Ok(()) => {
            tracing::info!("Server exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
