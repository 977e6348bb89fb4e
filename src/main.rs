#![allow(clippy::uninlined_format_args)]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagesense::errors::PerceptionError;
use pagesense::types::OutputFormat;

mod commands;

use crate::commands::utils::BrowserArgs;

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "pagesense")]
#[command(about = "Compact, addressable views of live web pages for automation agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the interactive elements of a page in compact form
    Extract {
        /// URL to extract
        url: String,

        #[command(flatten)]
        browser: BrowserArgs,

        /// Include elements outside the viewport
        #[arg(long)]
        full_page: bool,

        /// Omit the `b` (box) key
        #[arg(long)]
        no_bounds: bool,

        /// Omit the `c` (center) key
        #[arg(long)]
        no_center: bool,

        /// Longest name to emit, in characters
        #[arg(long)]
        max_name_length: Option<usize>,

        /// Stability timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Print the key to the compact output format
    Legend {
        /// Output format
        #[arg(short, long, default_value = "simple")]
        format: OutputFormat,
    },

    /// Check a saved payload against the size ceiling
    CheckSize {
        /// File holding the serialized payload
        file: PathBuf,

        /// Fail at or past this many bytes
        #[arg(long)]
        max_bytes: Option<usize>,

        /// Warn at or past this many bytes
        #[arg(long)]
        warn_bytes: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Wait for a page to settle and report how long it took
    WaitStable {
        /// URL to load
        url: String,

        #[command(flatten)]
        browser: BrowserArgs,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Required quiet period with no DOM mutation, in milliseconds
        #[arg(long)]
        threshold: Option<u64>,

        /// Do not wait for network activity to stop
        #[arg(long)]
        ignore_network: bool,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// List the stable identities assigned on a page
    Tags {
        /// URL to tag
        url: String,

        #[command(flatten)]
        browser: BrowserArgs,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            // Convert to our error type to get proper exit code
            let err: PerceptionError = err.into();

            // Output JSON error to stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": err.to_string(),
                "exit_code": err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            // Also log to stderr for human reading
            eprintln!("Error: {}", err);
            std::process::exit(err.exit_code());
        }
    }
}

async fn run() -> Result<()> {
    // Initialize tracing to stderr (so JSON output to stdout remains clean)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagesense=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();
    let config = commands::utils::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract {
            url,
            browser,
            full_page,
            no_bounds,
            no_center,
            max_name_length,
            timeout,
            format,
        } => {
            let options = commands::extract::ExtractOptions {
                full_page,
                no_bounds,
                no_center,
                max_name_length,
                timeout,
            };
            commands::extract::handle_extract(url, browser, options, config, format).await?
        }

        Commands::Legend { format } => commands::legend::handle_legend(format)?,

        Commands::CheckSize {
            file,
            max_bytes,
            warn_bytes,
            format,
        } => commands::check_size::handle_check_size(file, max_bytes, warn_bytes, config, format)?,

        Commands::WaitStable {
            url,
            browser,
            timeout,
            threshold,
            ignore_network,
            format,
        } => {
            commands::wait_stable::handle_wait_stable(
                url,
                browser,
                timeout,
                threshold,
                ignore_network,
                config,
                format,
            )
            .await?
        }

        Commands::Tags {
            url,
            browser,
            format,
        } => commands::tags::handle_tags(url, browser, config, format).await?,
    }

    Ok(())
}
