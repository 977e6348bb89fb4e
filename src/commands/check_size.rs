use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use pagesense::config::PerceptionConfig;
use pagesense::serializer::{SizeLimits, validate_size};
use pagesense::types::OutputFormat;

pub fn limits(config: &PerceptionConfig, max_bytes: Option<usize>, warn_bytes: Option<usize>) -> SizeLimits {
    SizeLimits {
        max_bytes: max_bytes.unwrap_or(config.size.max_bytes),
        warn_bytes: warn_bytes.unwrap_or(config.size.warn_bytes),
    }
}

pub fn handle_check_size(
    file: PathBuf,
    max_bytes: Option<usize>,
    warn_bytes: Option<usize>,
    config: PerceptionConfig,
    format: OutputFormat,
) -> Result<()> {
    info!("Checking payload size of {}", file.display());
    let payload = fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let report = validate_size(&payload, &limits(&config, max_bytes, warn_bytes))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Simple => {
            let status = if report.warned { "near limit" } else { "ok" };
            println!(
                "{}: {} bytes, ~{} tokens ({})",
                file.display(),
                report.bytes,
                report.estimated_tokens,
                status
            );
        }
    }
    Ok(())
}
