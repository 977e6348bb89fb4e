//! DOM/layout snapshot model.
//!
//! Mirrors the shape of `DOMSnapshot.captureSnapshot`: flat per-document
//! node and layout tables whose strings live in one shared string table.
//! [`Document::from_snapshot`] rebuilds an in-memory page from it so the
//! tagger and the fusion path can run against a live page.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dom::{ComputedStyle, Document, ElementSpec, NodeId};
use crate::events::ReadyState;
use crate::types::{BoundingBox, ScrollPosition};

/// Computed styles requested with every capture, in this order
pub const SNAPSHOT_STYLES: &[&str] = &["display", "visibility", "opacity"];

const ELEMENT_NODE: i64 = 1;
const TEXT_NODE: i64 = 3;
const DOCUMENT_NODE: i64 = 9;
const DOCUMENT_FRAGMENT_NODE: i64 = 11;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    #[serde(default)]
    pub documents: Vec<DocumentSnapshot>,
    #[serde(default)]
    pub strings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(rename = "documentURL", default)]
    pub document_url: i64,
    #[serde(default)]
    pub title: i64,
    #[serde(default)]
    pub frame_id: i64,
    #[serde(default)]
    pub nodes: NodeTreeSnapshot,
    #[serde(default)]
    pub layout: LayoutTreeSnapshot,
    #[serde(default)]
    pub scroll_offset_x: Option<f64>,
    #[serde(default)]
    pub scroll_offset_y: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTreeSnapshot {
    #[serde(default)]
    pub parent_index: Vec<i64>,
    #[serde(default)]
    pub node_type: Vec<i64>,
    #[serde(default)]
    pub node_name: Vec<i64>,
    #[serde(default)]
    pub node_value: Vec<i64>,
    #[serde(default)]
    pub backend_node_id: Vec<i64>,
    /// Flattened `[name, value, name, value, ...]` string indexes per node
    #[serde(default)]
    pub attributes: Vec<Vec<i64>>,
    #[serde(default)]
    pub shadow_root_type: Option<RareStringData>,
    #[serde(default)]
    pub content_document_index: Option<RareIntegerData>,
    #[serde(default)]
    pub input_value: Option<RareStringData>,
    #[serde(default)]
    pub input_checked: Option<RareBooleanData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutTreeSnapshot {
    #[serde(default)]
    pub node_index: Vec<i64>,
    /// Values of [`SNAPSHOT_STYLES`] per layout entry
    #[serde(default)]
    pub styles: Vec<Vec<i64>>,
    #[serde(default)]
    pub bounds: Vec<Vec<f64>>,
    #[serde(default)]
    pub text: Vec<i64>,
}

/// Sparse string column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RareStringData {
    pub index: Vec<i64>,
    pub value: Vec<i64>,
}

impl RareStringData {
    fn get(&self, node: usize) -> Option<i64> {
        self.index
            .iter()
            .position(|i| *i == node as i64)
            .and_then(|pos| self.value.get(pos).copied())
    }
}

/// Sparse integer column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RareIntegerData {
    pub index: Vec<i64>,
    pub value: Vec<i64>,
}

impl RareIntegerData {
    fn get(&self, node: usize) -> Option<i64> {
        self.index
            .iter()
            .position(|i| *i == node as i64)
            .and_then(|pos| self.value.get(pos).copied())
    }
}

/// Sparse boolean column: listed nodes are `true`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RareBooleanData {
    pub index: Vec<i64>,
}

impl RareBooleanData {
    fn contains(&self, node: usize) -> bool {
        self.index.contains(&(node as i64))
    }
}

/// Layout facts for one rendered node, in top-level document coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutEntry {
    pub bounds: BoundingBox,
    pub style: ComputedStyle,
}

impl DocumentSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.parent_index.len()
    }

    fn content_document(&self, node: usize) -> Option<usize> {
        self.nodes
            .content_document_index
            .as_ref()
            .and_then(|data| data.get(node))
            .and_then(|idx| usize::try_from(idx).ok())
    }

    /// Snapshot node index -> layout table row
    fn layout_rows(&self) -> HashMap<usize, usize> {
        self.layout
            .node_index
            .iter()
            .enumerate()
            .filter_map(|(row, node)| usize::try_from(*node).ok().map(|n| (n, row)))
            .collect()
    }
}

impl DomSnapshot {
    /// Resolve a string-table index; out-of-range and negative indexes are empty
    pub fn string(&self, index: i64) -> &str {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn node_count(&self) -> usize {
        self.documents.iter().map(DocumentSnapshot::node_count).sum()
    }

    /// Origin of each document's coordinate space inside the top-level
    /// document, found by walking frame owners from document 0.
    fn document_offsets(&self) -> Vec<(f64, f64)> {
        let mut offsets = vec![(0.0, 0.0); self.documents.len()];
        let mut seen = HashSet::from([0usize]);
        let mut stack = vec![0usize];

        while let Some(d) = stack.pop() {
            let Some(doc) = self.documents.get(d) else {
                continue;
            };
            let rows = doc.layout_rows();
            for node in 0..doc.node_count() {
                let Some(child) = doc.content_document(node) else {
                    continue;
                };
                if child >= self.documents.len() || !seen.insert(child) {
                    continue;
                }
                let origin = rows
                    .get(&node)
                    .and_then(|row| doc.layout.bounds.get(*row))
                    .and_then(|b| BoundingBox::from_slice(b))
                    .map(|b| (b.x + offsets[d].0, b.y + offsets[d].1))
                    .unwrap_or(offsets[d]);
                offsets[child] = origin;
                stack.push(child);
            }
        }
        offsets
    }

    fn style_at(&self, doc: &DocumentSnapshot, row: usize) -> ComputedStyle {
        let values = doc.layout.styles.get(row).map(Vec::as_slice).unwrap_or(&[]);
        let mut style = ComputedStyle::default();
        for (name, idx) in SNAPSHOT_STYLES.iter().zip(values) {
            let value = self.string(*idx);
            if value.is_empty() {
                continue;
            }
            match *name {
                "display" => style.display = value.to_string(),
                "visibility" => style.visibility = value.to_string(),
                "opacity" => style.opacity = value.parse().unwrap_or(1.0),
                _ => {}
            }
        }
        style
    }

    /// Layout of every rendered node, keyed by backend node handle
    pub fn layout_by_backend(&self) -> HashMap<i64, LayoutEntry> {
        let offsets = self.document_offsets();
        let mut out = HashMap::new();

        for (d, doc) in self.documents.iter().enumerate() {
            let (dx, dy) = offsets.get(d).copied().unwrap_or((0.0, 0.0));
            for (row, node) in doc.layout.node_index.iter().enumerate() {
                let Some(backend) = usize::try_from(*node)
                    .ok()
                    .and_then(|n| doc.nodes.backend_node_id.get(n))
                else {
                    continue;
                };
                let Some(bounds) = doc
                    .layout
                    .bounds
                    .get(row)
                    .and_then(|b| BoundingBox::from_slice(b))
                else {
                    continue;
                };
                out.insert(
                    *backend,
                    LayoutEntry {
                        bounds: bounds.translate(dx, dy),
                        style: self.style_at(doc, row),
                    },
                );
            }
        }
        out
    }
}

/// Where the children of a snapshot node go in the mirror
#[derive(Debug, Clone, Copy)]
enum Slot {
    Light(NodeId),
    Shadow(NodeId),
    Skip,
}

struct Mirror<'a> {
    snapshot: &'a DomSnapshot,
    offsets: Vec<(f64, f64)>,
    visited: HashSet<usize>,
}

impl Mirror<'_> {
    fn copy_document(&mut self, doc: &mut Document, index: usize, attach_to: NodeId) {
        if !self.visited.insert(index) {
            warn!("Snapshot document {} referenced twice; skipping", index);
            return;
        }
        let snapshot = self.snapshot;
        let Some(source) = snapshot.documents.get(index) else {
            return;
        };
        let is_main = index == 0;
        let rows = source.layout_rows();
        let (dx, dy) = self.offsets.get(index).copied().unwrap_or((0.0, 0.0));
        let nodes = &source.nodes;
        let count = source.node_count();
        let mut slots = vec![Slot::Skip; count];

        for i in 0..count {
            let parent = nodes.parent_index.get(i).copied().unwrap_or(-1);
            let parent_slot = match usize::try_from(parent) {
                Ok(p) if p < i => slots[p],
                Ok(_) => Slot::Skip,
                Err(_) => Slot::Light(attach_to),
            };

            match nodes.node_type.get(i).copied().unwrap_or(0) {
                DOCUMENT_NODE => slots[i] = parent_slot,
                DOCUMENT_FRAGMENT_NODE => {
                    let kind = nodes
                        .shadow_root_type
                        .as_ref()
                        .and_then(|data| data.get(i))
                        .map(|idx| snapshot.string(idx));
                    slots[i] = match (kind, parent_slot) {
                        (Some("user-agent"), _) | (None, _) => Slot::Skip,
                        (Some(_), Slot::Light(host)) => Slot::Shadow(host),
                        (Some(_), _) => Slot::Skip,
                    };
                }
                TEXT_NODE => {
                    if let Slot::Light(owner) = parent_slot {
                        let text = snapshot.string(nodes.node_value.get(i).copied().unwrap_or(-1));
                        if !text.trim().is_empty() {
                            let joined = match doc.element(owner).own_text() {
                                "" => text.trim().to_string(),
                                existing => format!("{} {}", existing, text.trim()),
                            };
                            doc.set_text(owner, &joined);
                        }
                    }
                }
                ELEMENT_NODE => {
                    if matches!(parent_slot, Slot::Skip) {
                        continue;
                    }
                    let tag = snapshot
                        .string(nodes.node_name.get(i).copied().unwrap_or(-1))
                        .to_ascii_lowercase();
                    let top_level = parent >= 0
                        && nodes.node_type.get(parent as usize) == Some(&DOCUMENT_NODE);

                    let node = if is_main && top_level && tag == "html" {
                        doc.root()
                    } else {
                        let mut spec = self.element_spec(source, i, &tag, &rows, (dx, dy));
                        if !is_main && top_level {
                            spec = spec.frame(&self.frame_name(source, index));
                        }
                        match parent_slot {
                            Slot::Light(p) if is_main && tag == "body" && p == doc.root() && doc.body().is_none() => {
                                doc.attach_body(spec)
                            }
                            Slot::Light(p) => doc.append(p, spec),
                            Slot::Shadow(host) => doc.append_shadow(host, spec),
                            Slot::Skip => continue,
                        }
                    };
                    slots[i] = Slot::Light(node);

                    if let Some(child) = source.content_document(i) {
                        self.copy_document(doc, child, node);
                    }
                }
                _ => {}
            }
        }
    }

    fn frame_name(&self, source: &DocumentSnapshot, index: usize) -> String {
        match self.snapshot.string(source.frame_id) {
            "" => format!("frame-{}", index),
            name => name.to_string(),
        }
    }

    fn element_spec(
        &self,
        source: &DocumentSnapshot,
        i: usize,
        tag: &str,
        rows: &HashMap<usize, usize>,
        (dx, dy): (f64, f64),
    ) -> ElementSpec {
        let nodes = &source.nodes;
        let mut attrs: Vec<(String, String)> = Vec::new();
        if let Some(flat) = nodes.attributes.get(i) {
            for pair in flat.chunks(2) {
                if let [name, value] = pair {
                    attrs.push((
                        self.snapshot.string(*name).to_string(),
                        self.snapshot.string(*value).to_string(),
                    ));
                }
            }
        }
        // Live form state overrides the markup
        if let Some(value) = nodes.input_value.as_ref().and_then(|d| d.get(i)) {
            attrs.retain(|(k, _)| !k.eq_ignore_ascii_case("value"));
            attrs.push(("value".to_string(), self.snapshot.string(value).to_string()));
        }
        if nodes.input_checked.as_ref().is_some_and(|d| d.contains(i))
            && !attrs.iter().any(|(k, _)| k.eq_ignore_ascii_case("checked"))
        {
            attrs.push(("checked".to_string(), String::new()));
        }

        let mut spec = ElementSpec::new(tag);
        for (name, value) in &attrs {
            spec = spec.attr(name, value);
        }
        if let Some(backend) = nodes.backend_node_id.get(i) {
            spec = spec.backend_node_id(*backend);
        }

        match rows.get(&i) {
            Some(row) => {
                let bounds = source
                    .layout
                    .bounds
                    .get(*row)
                    .and_then(|b| BoundingBox::from_slice(b))
                    .unwrap_or_default()
                    .translate(dx, dy);
                spec.bounds(bounds).style(self.snapshot.style_at(source, *row))
            }
            // No layout object: not rendered
            None => spec.style(ComputedStyle::not_rendered()),
        }
    }
}

impl Document {
    /// Rebuild a page from a DOM snapshot. Frame content is nested under its
    /// owner element; user-agent shadow roots are left out.
    pub fn from_snapshot(snapshot: &DomSnapshot) -> Document {
        let Some(main) = snapshot.documents.first() else {
            debug!("Snapshot has no documents; mirroring an empty page");
            return Document::without_body("about:blank");
        };

        let mut doc = Document::without_body(snapshot.string(main.document_url));
        let frame = snapshot.string(main.frame_id);
        if !frame.is_empty() {
            doc.set_frame_id(frame);
        }
        doc.set_title(snapshot.string(main.title));
        doc.set_scroll(ScrollPosition {
            x: main.scroll_offset_x.unwrap_or(0.0),
            y: main.scroll_offset_y.unwrap_or(0.0),
        });

        let mut mirror = Mirror {
            snapshot,
            offsets: snapshot.document_offsets(),
            visited: HashSet::new(),
        };
        let root = doc.root();
        mirror.copy_document(&mut doc, 0, root);
        doc.set_ready_state(ReadyState::Complete);

        debug!(
            "Mirrored {} snapshot nodes into {} elements",
            snapshot.node_count(),
            doc.len()
        );
        doc
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod snapshot_test;
