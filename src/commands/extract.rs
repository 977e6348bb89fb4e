use anyhow::Result;
use tracing::info;

use pagesense::config::PerceptionConfig;
use pagesense::perceiver::{Perceiver, Perception};
use pagesense::serializer::SemanticNode;
use pagesense::types::OutputFormat;

use crate::commands::utils::{self, BrowserArgs};

/// Flag overrides for the extraction section of the configuration
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub full_page: bool,
    pub no_bounds: bool,
    pub no_center: bool,
    pub max_name_length: Option<usize>,
    pub timeout: Option<u64>,
}

impl ExtractOptions {
    pub fn apply(&self, mut config: PerceptionConfig) -> PerceptionConfig {
        if self.full_page {
            config.extraction.viewport_only = false;
        }
        if self.no_bounds {
            config.extraction.include_bounds = false;
        }
        if self.no_center {
            config.extraction.include_center = false;
        }
        if let Some(max) = self.max_name_length {
            config.extraction.max_name_length = max;
        }
        if let Some(timeout) = self.timeout {
            config.stability.timeout_ms = timeout;
        }
        config
    }
}

pub fn format_node(node: &SemanticNode) -> String {
    let mut line = format!("[{}] {} \"{}\"", node.i, node.r, node.n);
    if let Some(value) = &node.v {
        line.push_str(&format!(" = \"{}\"", value));
    }
    if !node.s.is_empty() {
        line.push_str(&format!(" ({})", node.s.join(", ")));
    }
    if let Some([x, y]) = node.c {
        line.push_str(&format!(" @ ({}, {})", x, y));
    }
    line
}

fn print_simple(perception: &Perception) {
    let result = &perception.result;
    println!("{} - {}", result.title, result.url);
    println!(
        "{} elements, ~{} tokens, {:?} path",
        result.meta.node_count, result.meta.estimated_tokens, perception.path
    );
    for node in &result.nodes {
        println!("  {}", format_node(node));
    }
}

pub async fn handle_extract(
    url: String,
    browser: BrowserArgs,
    options: ExtractOptions,
    config: PerceptionConfig,
    format: OutputFormat,
) -> Result<()> {
    info!("Extracting {}", url);
    let config = options.apply(config);
    let (chrome, session) = utils::open_page(&url, &browser).await?;

    let perceiver = Perceiver::new(session, config);
    perceiver.start_auto_tagging().await;
    let outcome = perceiver.perceive().await;
    drop(perceiver);
    chrome.close().await?;

    let perception = outcome?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&perception)?),
        OutputFormat::Simple => print_simple(&perception),
    }
    Ok(())
}
