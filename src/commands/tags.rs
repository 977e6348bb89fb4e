use anyhow::Result;
use tracing::info;

use pagesense::config::PerceptionConfig;
use pagesense::perceiver::Perceiver;
use pagesense::types::OutputFormat;

use crate::commands::utils::{self, BrowserArgs};

pub async fn handle_tags(
    url: String,
    browser: BrowserArgs,
    config: PerceptionConfig,
    format: OutputFormat,
) -> Result<()> {
    info!("Tagging {}", url);
    let (chrome, session) = utils::open_page(&url, &browser).await?;

    let perceiver = Perceiver::new(session, config);
    perceiver.start_auto_tagging().await;
    perceiver.settle().await;
    let outcome = perceiver.identities().await;
    drop(perceiver);
    chrome.close().await?;

    let identities = outcome?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&identities)?),
        OutputFormat::Simple => {
            println!("{} tagged elements", identities.len());
            for identity in &identities {
                let mut line = format!("  [{}] <{}>", identity.id, identity.tag);
                if identity.in_shadow {
                    line.push_str(" (shadow)");
                }
                if let Some(frame) = &identity.frame_id {
                    line.push_str(&format!(" frame={}", frame));
                }
                println!("{}", line);
            }
        }
    }
    Ok(())
}
