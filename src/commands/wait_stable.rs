use anyhow::Result;
use tracing::info;

use pagesense::config::PerceptionConfig;
use pagesense::errors::PerceptionError;
use pagesense::stability::{StabilityConfig, StabilityResult, wait_for_page_ready};
use pagesense::types::OutputFormat;

use crate::commands::utils::{self, BrowserArgs};

pub fn stability_config(
    config: &PerceptionConfig,
    timeout: Option<u64>,
    threshold: Option<u64>,
    ignore_network: bool,
) -> StabilityConfig {
    let mut stability = config.stability.clone();
    if let Some(timeout) = timeout {
        stability.timeout_ms = timeout;
    }
    if let Some(threshold) = threshold {
        stability.stability_threshold_ms = threshold;
    }
    if ignore_network {
        stability.wait_for_network_idle = false;
    }
    stability
}

/// A page that never settled is a timeout at the command line
pub fn settled(result: StabilityResult) -> Result<StabilityResult, PerceptionError> {
    if result.stable {
        return Ok(result);
    }
    Err(PerceptionError::Timeout(format!(
        "page still active after {}ms ({} mutations)",
        result.wait_time_ms, result.mutation_count
    )))
}

pub async fn handle_wait_stable(
    url: String,
    browser: BrowserArgs,
    timeout: Option<u64>,
    threshold: Option<u64>,
    ignore_network: bool,
    config: PerceptionConfig,
    format: OutputFormat,
) -> Result<()> {
    let stability = stability_config(&config, timeout, threshold, ignore_network);
    info!("Waiting for {} to settle (timeout {}ms)", url, stability.timeout_ms);

    let (chrome, session) = utils::open_page(&url, &browser).await?;
    let outcome = wait_for_page_ready(&session, &stability).await;
    drop(session);
    chrome.close().await?;

    let result = settled(outcome)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Simple => println!(
            "Page settled after {}ms ({} mutations)",
            result.wait_time_ms, result.mutation_count
        ),
    }
    Ok(())
}
