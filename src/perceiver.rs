//! One perception pass: settle, extract, fall back, guard the size.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PerceptionConfig;
use crate::dom::Document;
use crate::errors::{PerceptionError, ProtocolError};
use crate::extraction::{ExtractionResult, ProtocolExtractor, resolve_backend_node};
use crate::fusion::{
    CoverageMetrics, DomElement, HybridElement, analyze_coverage, assign_identities,
    collect_dom_elements, select_elements_accessibility_first, simplify_ax_tree,
};
use crate::scripts::{METADATA_SCRIPT, dom_collection_script};
use crate::serializer::{SizeReport, serialize, validate_size};
use crate::session::{AxNode, DebugSession};
use crate::snapshot::SNAPSHOT_STYLES;
use crate::stability::{PageProbe, StabilityResult, wait_for_page_ready};
use crate::tagger::{AutoTagger, SharedTagging, TaggingContext, tagged_elements};
use crate::types::PageMetadata;

/// Which pipeline produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerceptionPath {
    Protocol,
    Fusion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Perception {
    pub result: ExtractionResult,
    pub path: PerceptionPath,
    /// Only computed on the fusion path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageMetrics>,
    pub stability: StabilityResult,
    pub size: SizeReport,
}

/// One identity as seen on the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: u64,
    pub backend_node_id: Option<i64>,
    pub tag: String,
    pub in_shadow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
}

pub struct Perceiver<S> {
    session: Arc<S>,
    tagging: SharedTagging,
    config: PerceptionConfig,
}

impl<S> Perceiver<S>
where
    S: DebugSession + PageProbe + 'static,
{
    pub fn new(session: S, config: PerceptionConfig) -> Self {
        Self {
            session: Arc::new(session),
            tagging: TaggingContext::new().into_shared(),
            config,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn tagging(&self) -> &SharedTagging {
        &self.tagging
    }

    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    /// Wait for the page to settle. Never fails; an unstable page is
    /// extracted anyway.
    pub async fn settle(&self) -> StabilityResult {
        let result = wait_for_page_ready(&*self.session, &self.config.stability).await;
        if !result.stable {
            warn!(
                "Page did not settle within {}ms, extracting anyway",
                self.config.stability.timeout_ms
            );
        }
        result
    }

    /// Tag the page now and, when enabled, re-tag it after every settled
    /// burst of DOM growth until [`Perceiver::reset`]. Returns how many
    /// elements the first pass tagged.
    pub async fn start_auto_tagging(&self) -> usize {
        let initial = match tag_live_page(&*self.session, &self.tagging).await {
            Ok(count) => count,
            Err(e) => {
                debug!("Initial tagging pass failed: {}", e);
                0
            }
        };
        if !self.config.tagger.auto_tag {
            return initial;
        }

        let feed = self.session.activity().await;
        let session = Arc::clone(&self.session);
        let tagging = Arc::clone(&self.tagging);
        let debounce = Duration::from_millis(self.config.tagger.debounce_ms);
        let handle = AutoTagger::spawn_with(feed, debounce, move || {
            let session = Arc::clone(&session);
            let tagging = Arc::clone(&tagging);
            async move {
                tag_live_page(&*session, &tagging).await.unwrap_or_else(|e| {
                    debug!("Auto-tagger pass skipped: {}", e);
                    0
                })
            }
        });
        self.tagging.lock().await.attach_auto_tagger(handle);
        info!("Auto-tagging every {}ms of quiet", self.config.tagger.debounce_ms);
        initial
    }

    pub async fn perceive(&self) -> Result<Perception, PerceptionError> {
        let stability = self.settle().await;
        let extractor = ProtocolExtractor::new(self.config.extraction.clone());

        let primary = {
            let mut tagging = self.tagging.lock().await;
            extractor.extract(&*self.session, &mut tagging).await
        };
        let (result, path, coverage) = match primary {
            Ok(result) => (result, PerceptionPath::Protocol, None),
            Err(e) if e.is_protocol_failure() => {
                warn!("Protocol extraction failed, falling back to DOM fusion: {}", e);
                let (result, coverage) = self.fuse().await;
                (result, PerceptionPath::Fusion, Some(coverage))
            }
            Err(e) => return Err(e),
        };

        let payload = serde_json::to_string(&result).map_err(|e| PerceptionError::Other(e.into()))?;
        let size = validate_size(&payload, &self.config.size)?;
        info!(
            "Perceived {} elements via {:?} path ({} bytes, ~{} tokens)",
            result.nodes.len(),
            path,
            size.bytes,
            size.estimated_tokens
        );

        Ok(Perception {
            result,
            path,
            coverage,
            stability,
            size,
        })
    }

    /// Fallback: whatever accessibility data is available fused with a
    /// direct DOM enumeration. Either source may be missing; with neither
    /// the result is empty.
    async fn fuse(&self) -> (ExtractionResult, CoverageMetrics) {
        let started = Instant::now();

        let ax_nodes = match self.accessibility_tree().await {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!("Accessibility tree unavailable: {}", e);
                Vec::new()
            }
        };
        let (dom, mirror) = match self.dom_elements().await {
            Ok(found) => found,
            Err(e) => {
                warn!("No DOM source available: {}", e);
                (Vec::new(), None)
            }
        };
        let metadata = match self.page_metadata().await {
            Some(metadata) => metadata,
            None => mirror.as_ref().map(Document::metadata).unwrap_or_default(),
        };

        let ax = simplify_ax_tree(&ax_nodes);
        let coverage = analyze_coverage(&ax, &dom);
        let mut fused = select_elements_accessibility_first(&ax, &dom, None, &self.config.fusion);
        assign_identities(&mut fused, &mut *self.tagging.lock().await);
        let mut nodes = serialize(&self.prune(fused, &metadata));
        for node in &mut nodes {
            self.config.extraction.apply_geometry(node);
        }

        debug!("Accessibility coverage {:.1}%", coverage.ax_coverage);
        (
            ExtractionResult::new(nodes, metadata, ax_nodes.len(), started),
            coverage,
        )
    }

    async fn page_metadata(&self) -> Option<PageMetadata> {
        let raw = self
            .session
            .evaluate(METADATA_SCRIPT)
            .await
            .map_err(|e| debug!("Page metadata unavailable: {}", e))
            .ok()?;
        serde_json::from_value(raw)
            .map_err(|e| debug!("Unexpected page metadata: {}", e))
            .ok()
    }

    async fn accessibility_tree(&self) -> Result<Vec<AxNode>, ProtocolError> {
        self.session.enable_accessibility().await?;
        self.session.full_accessibility_tree().await
    }

    /// DOM elements from a tagged snapshot mirror, or from an in-page
    /// enumeration when the snapshot is unavailable.
    async fn dom_elements(&self) -> Result<(Vec<DomElement>, Option<Document>), ProtocolError> {
        let snapshot_error = match self.session.capture_snapshot(SNAPSHOT_STYLES).await {
            Ok(snapshot) => {
                let mut mirror = Document::from_snapshot(&snapshot);
                self.tagging.lock().await.ensure_stable_ids(&mut mirror, None);
                return Ok((collect_dom_elements(&mirror), Some(mirror)));
            }
            Err(e) => e,
        };
        debug!("Snapshot unavailable, enumerating in page: {}", snapshot_error);

        let raw = self
            .session
            .evaluate(&dom_collection_script())
            .await
            .map_err(|e| {
                debug!("In-page enumeration failed too: {}", e);
                snapshot_error.clone()
            })?;
        let elements = serde_json::from_value(raw).map_err(|e| {
            debug!("Unexpected enumeration result: {}", e);
            snapshot_error
        })?;
        Ok((elements, None))
    }

    /// Apply the extraction options to fused elements and move their boxes
    /// into viewport coordinates
    fn prune(&self, elements: Vec<HybridElement>, metadata: &PageMetadata) -> Vec<HybridElement> {
        let options = &self.config.extraction;
        let visible = metadata.visible_rect();
        elements
            .into_iter()
            .filter(|el| !options.viewport_only || el.bounds.is_none_or(|b| b.intersects(&visible)))
            .map(|mut el| {
                el.name = el.name.chars().take(options.max_name_length).collect();
                el.bounds = el
                    .bounds
                    .map(|b| b.translate(-metadata.scroll.x, -metadata.scroll.y));
                el
            })
            .collect()
    }

    /// Live object reference for a stable identity
    pub async fn resolve(&self, id: u64) -> Result<String, PerceptionError> {
        let backend = self.tagging.lock().await.backend_node_for(id);
        match backend {
            Some(backend_node_id) => resolve_backend_node(&*self.session, backend_node_id).await,
            None => Err(PerceptionError::Other(anyhow::anyhow!(
                "No element has been tagged with id {}",
                id
            ))),
        }
    }

    /// Tag the current page and list every identity on it
    pub async fn identities(&self) -> Result<Vec<Identity>, PerceptionError> {
        let snapshot = self.session.capture_snapshot(SNAPSHOT_STYLES).await?;
        let mut mirror = Document::from_snapshot(&snapshot);
        self.tagging.lock().await.ensure_stable_ids(&mut mirror, None);
        Ok(tagged_elements(&mirror)
            .into_iter()
            .map(|t| {
                let el = mirror.element(t.node);
                Identity {
                    id: t.id,
                    backend_node_id: el.backend_node_id(),
                    tag: el.tag().to_string(),
                    in_shadow: t.in_shadow,
                    frame_id: t.frame_id,
                }
            })
            .collect())
    }

    /// Navigation boundary: identities from here on start over and the
    /// auto-tagger stops
    pub async fn reset(&self) {
        self.tagging.lock().await.reset();
    }
}

impl<S> Drop for Perceiver<S> {
    fn drop(&mut self) {
        // The auto-tagger task holds the session; it must not outlive us
        if let Ok(mut tagging) = self.tagging.try_lock() {
            tagging.stop_auto_tagger();
        }
    }
}

/// One tagging pass over a fresh snapshot mirror of the live page
async fn tag_live_page<S: DebugSession + ?Sized>(
    session: &S,
    tagging: &SharedTagging,
) -> Result<usize, ProtocolError> {
    let snapshot = session.capture_snapshot(SNAPSHOT_STYLES).await?;
    let mut mirror = Document::from_snapshot(&snapshot);
    Ok(tagging.lock().await.ensure_stable_ids(&mut mirror, None))
}
