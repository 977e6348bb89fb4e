use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;
use url::Url;

use pagesense::cdp::{CdpSession, ChromeInstance, LaunchOptions};
use pagesense::config::PerceptionConfig;
use pagesense::types::ViewportSize;

/// Browser flags shared by every command that loads a page
#[derive(Args, Debug, Clone, Default)]
pub struct BrowserArgs {
    /// Set viewport size (WIDTHxHEIGHT, e.g., 1920x1080)
    #[arg(long)]
    pub viewport: Option<String>,

    /// Run browser in visible mode (disables headless)
    #[arg(long = "no-headless")]
    pub no_headless: bool,

    /// Chrome or Chromium executable (auto-detected if not specified)
    #[arg(long)]
    pub chrome_path: Option<PathBuf>,
}

impl BrowserArgs {
    pub fn launch_options(&self) -> Result<LaunchOptions> {
        Ok(LaunchOptions {
            headless: !self.no_headless,
            viewport: self.viewport.as_deref().map(ViewportSize::parse).transpose()?,
            chrome_path: self.chrome_path.clone(),
        })
    }
}

pub fn load_config(path: Option<&Path>) -> Result<PerceptionConfig> {
    if let Some(path) = path {
        debug!("Loading configuration from {}", path.display());
    }
    PerceptionConfig::load(path)
}

/// Launch a browser and open `url` in it
pub async fn open_page(url: &str, browser: &BrowserArgs) -> Result<(ChromeInstance, CdpSession)> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    let options = browser.launch_options()?;
    let chrome = ChromeInstance::launch(&options).await?;
    match chrome.open(parsed.as_str()).await {
        Ok(session) => Ok((chrome, session)),
        Err(e) => {
            chrome.close().await?;
            Err(e)
        }
    }
}
