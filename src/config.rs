use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::extraction::ExtractionConfig;
use crate::fusion::FusionConfig;
use crate::serializer::SizeLimits;
use crate::stability::StabilityConfig;
use crate::tagger::TaggerConfig;

/// Everything tunable about one perception pipeline.
///
/// Every section is optional in a config file; missing keys take their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub stability: StabilityConfig,
    pub tagger: TaggerConfig,
    pub extraction: ExtractionConfig,
    pub fusion: FusionConfig,
    pub size: SizeLimits,
}

impl PerceptionConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
