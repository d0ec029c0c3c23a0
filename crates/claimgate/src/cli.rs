//! Operator CLI for claimgate
//!
//! - `claimgate check-config <file>` loads and validates a configuration
//! - `claimgate inspect --config <file> --token <jwt>` fetches the key set
//!   once and shows what the filter would inject for a token

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::claims::project;
use crate::config::FilterConfig;
use crate::error::FilterResult;
use crate::filter::ClaimFilter;
use crate::headers::HeaderMapHost;

/// claimgate - identity header filter
#[derive(Parser, Debug)]
#[command(
    name = "claimgate",
    version,
    about = "Check claimgate configuration and inspect tokens against a live key set"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v, -vv, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a configuration file
    CheckConfig {
        /// Configuration file (.toml, .yaml, .yml or .json)
        file: PathBuf,
    },

    /// Validate a token against the configured key set
    Inspect {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Bearer token (without the scheme)
        #[arg(short, long, env = "CLAIMGATE_TOKEN")]
        token: String,
    },
}

impl Cli {
    /// Execute the CLI command
    ///
    /// # Errors
    ///
    /// Returns the `FilterError` of the failed step.
    pub async fn execute(self) -> FilterResult<()> {
        self.init_tracing();

        match self.command {
            Command::CheckConfig { file } => check_config(&file),
            Command::Inspect { config, token } => inspect(&config, &token).await,
        }
    }

    /// Initialize tracing subscriber based on verbosity level
    fn init_tracing(&self) {
        let level = if self.quiet {
            Level::ERROR
        } else {
            match self.verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn check_config(file: &std::path::Path) -> FilterResult<()> {
    let config = FilterConfig::from_file(file)?;
    config.validate()?;

    println!("{}: ok", file.display());
    println!("  jwks_uri          {}", config.jwks_uri.as_deref().unwrap_or("(none)"));
    println!("  algorithm_family  {:?}", config.algorithm_family);
    println!("  refresh_interval  {}s", config.refresh_interval_secs);
    for mapping in &config.headers {
        println!("  header            {} <- {}", mapping.header, mapping.claim);
    }
    Ok(())
}

async fn inspect(config_file: &std::path::Path, token: &str) -> FilterResult<()> {
    let config = FilterConfig::from_file(config_file)?;
    let filter = ClaimFilter::on_start(config)?;

    let key_count = filter.on_timer().await?;
    println!("key set: {key_count} key(s)");

    let claims = filter.validator().validate(token).inspect_err(|e| {
        println!("rejected: {}", e.kind());
    })?;

    println!("verified: kid={}", claims.kid().unwrap_or("-"));

    let mut headers = http::HeaderMap::new();
    let summary = project(&claims, filter.header_map(), &mut HeaderMapHost::new(&mut headers));

    for (name, value) in &headers {
        println!("  {}: {}", name, value.to_str().unwrap_or("<non-ascii>"));
    }
    for name in &summary.missing {
        println!("  {name}: (claim absent)");
    }
    Ok(())
}
