//! Stable identity tagging.
//!
//! Every visible interactive element gets a monotonically increasing id
//! stamped on it as `data-ps-id`. Ids never change once assigned and are
//! never reused within a document. A [`TaggingContext`] holds the counter
//! for one document; [`TaggingContext::reset`] is the navigation boundary.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dom::{Document, NodeId, SharedDocument};
use crate::events::{ChangeSet, ChangeSource};
use crate::selector::SelectorList;

pub const ID_ATTR: &str = "data-ps-id";
pub const SHADOW_ATTR: &str = "data-ps-shadow";
pub const FRAME_ATTR: &str = "data-ps-frame";

/// The interactive element universe
pub const INTERACTIVE_SELECTORS: &[&str] = &[
    "a[href]",
    "button",
    "input",
    "textarea",
    "select",
    r#"[role="button"]"#,
    r#"[role="link"]"#,
    r#"[role="checkbox"]"#,
    r#"[role="radio"]"#,
    r#"[role="tab"]"#,
    r#"[role="menuitem"]"#,
    r#"[role="switch"]"#,
    r#"[role="combobox"]"#,
    r#"[role="textbox"]"#,
    r#"[role="slider"]"#,
    r#"[role="option"]"#,
    r#"[role="listbox"]"#,
    r#"[role="searchbox"]"#,
    "[onclick]",
    r#"[tabindex]:not([tabindex^="-"])"#,
    r#"[contenteditable]:not([contenteditable="false"])"#,
];

pub fn interactive_selector() -> SelectorList {
    // The list is static and covered by tests
    SelectorList::parse(&INTERACTIVE_SELECTORS.join(", "))
        .unwrap_or_else(|e| panic!("built-in interactive selector is invalid: {e}"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Quiet period that ends a burst of DOM growth
    pub debounce_ms: u64,
    /// Keep tagging in the background as the page grows
    pub auto_tag: bool,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            auto_tag: true,
        }
    }
}

/// Visibility gate for tagging. Inspection failures count as hidden.
pub fn is_visible(doc: &Document, node: NodeId) -> bool {
    let style = match doc.computed_style(node) {
        Ok(style) => style,
        Err(e) => {
            debug!("Visibility check failed, treating as hidden: {}", e);
            return false;
        }
    };
    if style.display == "none" || style.visibility == "hidden" || style.opacity <= 0.0 {
        return false;
    }

    let el = doc.element(node);
    if el.attribute("aria-hidden") == Some("true") || el.attribute("hidden").is_some() {
        return false;
    }
    if el.tag() == "input"
        && el
            .attribute("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
    {
        return false;
    }
    !el.rect().is_empty()
}

/// Stable id stamped on `node`, if any
pub fn stable_id(doc: &Document, node: NodeId) -> Option<u64> {
    doc.attribute(node, ID_ATTR)?.parse().ok()
}

/// Find the element carrying `id`, looking inside shadow roots too
pub fn find_by_stable_id(doc: &Document, id: u64) -> Option<NodeId> {
    let wanted = id.to_string();
    let nodes = doc
        .descendants_piercing(doc.root())
        .unwrap_or_else(|_| doc.descendants(doc.root()));
    nodes
        .into_iter()
        .find(|n| doc.attribute(*n, ID_ATTR) == Some(wanted.as_str()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedElement {
    pub id: u64,
    pub node: NodeId,
    pub in_shadow: bool,
    pub frame_id: Option<String>,
}

/// Every tagged element in document order
pub fn tagged_elements(doc: &Document) -> Vec<TaggedElement> {
    let nodes = doc
        .descendants_piercing(doc.root())
        .unwrap_or_else(|_| doc.descendants(doc.root()));
    nodes
        .into_iter()
        .filter_map(|node| {
            let id = stable_id(doc, node)?;
            Some(TaggedElement {
                id,
                node,
                in_shadow: doc.attribute(node, SHADOW_ATTR) == Some("true"),
                frame_id: doc.attribute(node, FRAME_ATTR).map(str::to_string),
            })
        })
        .collect()
}

/// Identity state for one loaded document
#[derive(Debug)]
pub struct TaggingContext {
    next_id: u64,
    frame_id: Option<String>,
    /// Backend node handle -> assigned id, so mirrors rebuilt from a new
    /// snapshot get their old ids back
    registry: HashMap<i64, u64>,
    selector: SelectorList,
    passes: u64,
    auto: Option<AutoTaggerHandle>,
}

pub type SharedTagging = Arc<Mutex<TaggingContext>>;

impl Default for TaggingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TaggingContext {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            frame_id: None,
            registry: HashMap::new(),
            selector: interactive_selector(),
            passes: 0,
            auto: None,
        }
    }

    pub fn into_shared(self) -> SharedTagging {
        Arc::new(Mutex::new(self))
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn frame_id(&self) -> Option<&str> {
        self.frame_id.as_deref()
    }

    /// Number of tagging passes run so far
    pub fn pass_count(&self) -> u64 {
        self.passes
    }

    /// Keep the counter ahead of an id stamped elsewhere
    pub fn observe(&mut self, id: u64) {
        self.next_id = self.next_id.max(id + 1);
    }

    pub fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Id registered for a backend handle, assigning one on first sight
    pub fn id_for_backend(&mut self, backend_node_id: i64) -> u64 {
        if let Some(id) = self.registry.get(&backend_node_id) {
            return *id;
        }
        let id = self.fresh_id();
        self.registry.insert(backend_node_id, id);
        id
    }

    pub fn backend_node_for(&self, id: u64) -> Option<i64> {
        self.registry
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(backend, _)| *backend)
    }

    /// Tag every untagged, visible interactive element under `root`
    /// (the whole document when `None`). Returns how many were newly tagged.
    pub fn ensure_stable_ids(&mut self, doc: &mut Document, root: Option<NodeId>) -> usize {
        self.passes += 1;
        let frame = self
            .frame_id
            .get_or_insert_with(|| doc.frame_id().to_string())
            .clone();
        let root = root.unwrap_or_else(|| doc.root());

        let candidates = doc.query_selector_all(root, &self.selector);
        let mut tagged = 0;

        for node in candidates {
            if let Some(existing) = stable_id(doc, node) {
                // Marks left by an earlier context must never collide with new ids
                self.observe(existing);
                continue;
            }
            if !is_visible(doc, node) {
                continue;
            }

            let backend = doc.element(node).backend_node_id();
            let (id, fresh) = match backend.and_then(|b| self.registry.get(&b)) {
                Some(id) => (*id, false),
                None => (self.fresh_id(), true),
            };

            doc.set_attribute(node, ID_ATTR, &id.to_string());
            if doc.is_in_shadow_tree(node) {
                doc.set_attribute(node, SHADOW_ATTR, "true");
            }
            let node_frame = doc.frame_of(node).to_string();
            let stamped_frame = if node_frame != doc.frame_id() {
                node_frame
            } else {
                frame.clone()
            };
            doc.set_attribute(node, FRAME_ATTR, &stamped_frame);

            if let Some(backend) = backend {
                self.registry.insert(backend, id);
            }
            if fresh {
                tagged += 1;
            }
        }

        if tagged > 0 {
            debug!("Tagged {} new interactive elements", tagged);
        }
        tagged
    }

    /// Replace the running auto-tagger, if any
    pub fn attach_auto_tagger(&mut self, handle: AutoTaggerHandle) {
        if let Some(old) = self.auto.replace(handle) {
            old.stop();
        }
    }

    pub fn auto_tagger_running(&self) -> bool {
        self.auto.as_ref().is_some_and(AutoTaggerHandle::is_running)
    }

    /// Forget everything about the current document
    pub fn reset(&mut self) {
        info!("Resetting tagging context");
        self.next_id = 1;
        self.frame_id = None;
        self.registry.clear();
        self.passes = 0;
        self.stop_auto_tagger();
    }

    pub fn stop_auto_tagger(&mut self) {
        if let Some(handle) = self.auto.take() {
            handle.stop();
        }
    }
}

#[derive(Debug)]
pub struct AutoTaggerHandle {
    task: JoinHandle<()>,
}

impl AutoTaggerHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Background re-tagging driven by batched change notifications
pub struct AutoTagger;

impl AutoTagger {
    /// Re-tag an in-memory document once per settled burst of DOM growth
    pub fn spawn<S>(
        document: SharedDocument,
        tagging: SharedTagging,
        source: S,
        debounce: Duration,
    ) -> AutoTaggerHandle
    where
        S: ChangeSource + 'static,
    {
        Self::spawn_with(source, debounce, move || {
            let document = document.clone();
            let tagging = tagging.clone();
            async move {
                let mut tagging = tagging.lock().await;
                let mut doc = document.lock().await;
                tagging.ensure_stable_ids(&mut doc, None)
            }
        })
    }

    /// Run `pass` once per settled burst of DOM growth.
    ///
    /// A burst ends when no batch arrives for `debounce`. Bursts that only
    /// touched attributes or text (including the tagger's own marks) are
    /// ignored. `pass` returns how many elements it newly tagged.
    pub fn spawn_with<S, F, Fut>(mut source: S, debounce: Duration, mut pass: F) -> AutoTaggerHandle
    where
        S: ChangeSource + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = usize> + Send,
    {
        let task = tokio::spawn(async move {
            while let Some(first) = source.next_batch().await {
                let mut pending: ChangeSet = first;
                let mut closed = false;
                loop {
                    match tokio::time::timeout(debounce, source.next_batch()).await {
                        Ok(Some(more)) => pending.merge(more),
                        Ok(None) => {
                            closed = true;
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if pending.has_additions() {
                    let count = pass().await;
                    debug!(
                        "Auto-tagger pass after {} added nodes tagged {}",
                        pending.added_nodes, count
                    );
                }
                if closed {
                    break;
                }
            }
            debug!("Auto-tagger change source closed");
        });
        AutoTaggerHandle { task }
    }
}

/// Tag the document now and keep tagging it as it grows
pub async fn start_auto_tagging(
    document: &SharedDocument,
    tagging: &SharedTagging,
    config: &TaggerConfig,
) -> usize {
    let (initial, feed) = {
        let mut ctx = tagging.lock().await;
        let mut doc = document.lock().await;
        let feed = doc.event_feed();
        (ctx.ensure_stable_ids(&mut doc, None), feed)
    };

    if config.auto_tag {
        let handle = AutoTagger::spawn(
            document.clone(),
            tagging.clone(),
            feed,
            Duration::from_millis(config.debounce_ms),
        );
        tagging.lock().await.attach_auto_tagger(handle);
    }
    initial
}

#[cfg(test)]
#[path = "tagger_test.rs"]
mod tagger_test;
