//! Protocol extraction: accessibility tree + DOM/layout snapshot, correlated
//! by backend node handle and pruned to the viewport.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::dom::Document;
use crate::errors::{PerceptionError, ProtocolCall, ProtocolError};
use crate::roles::{is_interactive_role, role_code};
use crate::scripts::METADATA_SCRIPT;
use crate::serializer::{SemanticNode, estimate_tokens};
use crate::session::{AxNode, DebugSession};
use crate::snapshot::{DomSnapshot, LayoutEntry, SNAPSHOT_STYLES};
use crate::tagger::{TaggingContext, tagged_elements};
use crate::types::{PageMetadata, ScrollPosition, ViewportSize};

/// Accessibility properties reported as states, in output order
pub const STATE_PROPERTIES: &[&str] = &[
    "checked", "expanded", "selected", "disabled", "pressed", "focused", "required",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Drop elements outside the visible rectangle
    pub viewport_only: bool,
    pub include_bounds: bool,
    pub include_center: bool,
    /// Longer names are cut to this many characters
    pub max_name_length: usize,
}

impl ExtractionConfig {
    /// Drop the geometry keys this configuration excludes
    pub fn apply_geometry(&self, node: &mut SemanticNode) {
        if !self.include_bounds {
            node.b = None;
        }
        if !self.include_center {
            node.c = None;
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            viewport_only: true,
            include_bounds: true,
            include_center: true,
            max_name_length: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionMeta {
    pub node_count: usize,
    pub extraction_time_ms: u64,
    pub ax_node_count: usize,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub nodes: Vec<SemanticNode>,
    pub viewport: ViewportSize,
    pub title: String,
    pub url: String,
    pub scroll: ScrollPosition,
    pub meta: ExtractionMeta,
}

impl ExtractionResult {
    pub fn new(nodes: Vec<SemanticNode>, metadata: PageMetadata, ax_node_count: usize, started: Instant) -> Self {
        let bytes = serde_json::to_vec(&nodes).map(|v| v.len()).unwrap_or(0);
        Self {
            meta: ExtractionMeta {
                node_count: nodes.len(),
                extraction_time_ms: started.elapsed().as_millis() as u64,
                ax_node_count,
                estimated_tokens: estimate_tokens(bytes),
            },
            nodes,
            viewport: metadata.viewport,
            title: metadata.title,
            url: metadata.url,
            scroll: metadata.scroll,
        }
    }
}

/// Raw material of one extraction, fetched concurrently
pub struct PageCapture {
    pub ax_nodes: Vec<AxNode>,
    pub snapshot: DomSnapshot,
    pub metadata: PageMetadata,
}

impl PageCapture {
    pub async fn fetch<S: DebugSession + ?Sized>(session: &S) -> Result<Self, ProtocolError> {
        let (ax_nodes, snapshot, raw_metadata) = tokio::try_join!(
            async {
                session.enable_accessibility().await?;
                session.full_accessibility_tree().await
            },
            session.capture_snapshot(SNAPSHOT_STYLES),
            session.evaluate(METADATA_SCRIPT),
        )?;
        let metadata = serde_json::from_value(raw_metadata).map_err(|e| {
            ProtocolError::new(ProtocolCall::Evaluate, format!("unexpected page metadata: {}", e))
        })?;
        Ok(Self {
            ax_nodes,
            snapshot,
            metadata,
        })
    }

    /// Page mirror tagged through `tagging`, ready for id lookups
    pub fn tagged_mirror(&self, tagging: &mut TaggingContext) -> Document {
        let mut mirror = Document::from_snapshot(&self.snapshot);
        mirror.set_viewport(self.metadata.viewport);
        mirror.set_scroll(self.metadata.scroll);
        let fresh = tagging.ensure_stable_ids(&mut mirror, None);
        debug!("Tagged {} new elements on the page mirror", fresh);
        mirror
    }
}

fn states(node: &AxNode) -> Vec<String> {
    let mut out = Vec::new();
    for name in STATE_PROPERTIES {
        let Some(value) = node.property(name) else {
            continue;
        };
        match value.as_bool() {
            Some(true) => out.push(name.to_string()),
            Some(false) => {}
            None if value.as_text().as_deref() == Some("mixed") => out.push("mixed".to_string()),
            None => {}
        }
    }
    out
}

pub struct ProtocolExtractor {
    config: ExtractionConfig,
}

impl Default for ProtocolExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

impl ProtocolExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Fetch, correlate and prune. Any protocol failure aborts the whole
    /// extraction so the caller can fall back.
    pub async fn extract<S: DebugSession + ?Sized>(
        &self,
        session: &S,
        tagging: &mut TaggingContext,
    ) -> Result<ExtractionResult, PerceptionError> {
        let started = Instant::now();
        let capture = PageCapture::fetch(session).await?;
        let mirror = capture.tagged_mirror(tagging);

        let ids: HashMap<i64, u64> = tagged_elements(&mirror)
            .into_iter()
            .filter_map(|t| {
                mirror
                    .element(t.node)
                    .backend_node_id()
                    .map(|backend| (backend, t.id))
            })
            .collect();
        let layout = capture.snapshot.layout_by_backend();
        let nodes = self.correlate(&capture.ax_nodes, &layout, &ids, &capture.metadata);

        let result = ExtractionResult::new(nodes, capture.metadata, capture.ax_nodes.len(), started);
        info!(
            "Extracted {} of {} accessibility nodes in {}ms",
            result.meta.node_count, result.meta.ax_node_count, result.meta.extraction_time_ms
        );
        Ok(result)
    }

    /// Match interactive accessibility nodes to their layout boxes
    pub fn correlate(
        &self,
        ax_nodes: &[AxNode],
        layout: &HashMap<i64, LayoutEntry>,
        ids: &HashMap<i64, u64>,
        metadata: &PageMetadata,
    ) -> Vec<SemanticNode> {
        let visible = metadata.visible_rect();
        let mut out = Vec::new();

        for node in ax_nodes.iter().filter(|n| !n.ignored) {
            let (Some(backend), Some(role)) = (node.backend_dom_node_id, node.role()) else {
                continue;
            };
            if !is_interactive_role(&role) {
                continue;
            }
            let Some(entry) = layout.get(&backend) else {
                continue;
            };
            if entry.bounds.is_empty() {
                continue;
            }
            if self.config.viewport_only && !entry.bounds.intersects(&visible) {
                continue;
            }

            let name: String = node
                .name()
                .unwrap_or_default()
                .chars()
                .take(self.config.max_name_length)
                .collect();
            let id = ids
                .get(&backend)
                .map(u64::to_string)
                .unwrap_or_else(|| format!("b{}", backend));

            let mut semantic = SemanticNode {
                i: id,
                r: role_code(&role).to_string(),
                n: name,
                v: node.value_text(),
                s: states(node),
                c: None,
                b: None,
            }
            .with_bounds(entry.bounds.translate(-metadata.scroll.x, -metadata.scroll.y));
            self.config.apply_geometry(&mut semantic);
            out.push(semantic);
        }
        out
    }
}

/// Map a backend handle to a live object reference
pub async fn resolve_backend_node<S: DebugSession + ?Sized>(
    session: &S,
    backend_node_id: i64,
) -> Result<String, PerceptionError> {
    match session.resolve_node(backend_node_id).await {
        Ok(Some(object_id)) => Ok(object_id),
        Ok(None) => Err(PerceptionError::Resolution { backend_node_id }),
        Err(e) if e.message.contains("No node") => {
            debug!("Backend node {} is gone: {}", backend_node_id, e);
            Err(PerceptionError::Resolution { backend_node_id })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "extraction_test.rs"]
mod extraction_test;
