//! In-memory page model.
//!
//! A [`Document`] is an arena of elements with computed style, layout box,
//! attached shadow roots, and nested frames. It is the host page the tagger
//! marks and the waiter watches: tests build one directly, and the live
//! protocol path mirrors one from a DOM snapshot (see [`crate::snapshot`]).
//! Every connected mutation is published to the document's [`EventHub`].

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::events::{EventFeed, EventHub, PageEvent, ReadyState};
use crate::selector::SelectorList;
use crate::types::{BoundingBox, PageMetadata, ScrollPosition, ViewportSize};

/// Nested shadow trees deeper than this abort the piercing traversal
pub const MAX_PIERCE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
        }
    }
}

impl ComputedStyle {
    /// Style of a node that produced no layout object
    pub fn not_rendered() -> Self {
        Self {
            display: "none".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleError {
    #[error("node {0:?} is not connected to the document")]
    Detached(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraversalError {
    #[error("shadow-piercing traversal exceeded depth {0}")]
    DepthExceeded(usize),
}

#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    style: ComputedStyle,
    rect: BoundingBox,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_children: Option<Vec<NodeId>>,
    /// Direct child of a shadow root (its parent is the host)
    in_shadow_root: bool,
    frame_id: Option<String>,
    backend_node_id: Option<i64>,
    connected: bool,
}

impl Element {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn rect(&self) -> BoundingBox {
        self.rect
    }

    pub fn own_text(&self) -> &str {
        &self.text
    }

    pub fn backend_node_id(&self) -> Option<i64> {
        self.backend_node_id
    }

    fn set_attribute(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((name, value.to_string())),
        }
    }
}

/// Declarative description of an element to insert
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    style: ComputedStyle,
    rect: BoundingBox,
    text: String,
    frame_id: Option<String>,
    backend_node_id: Option<i64>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = BoundingBox::new(x, y, width, height);
        self
    }

    pub fn bounds(mut self, rect: BoundingBox) -> Self {
        self.rect = rect;
        self
    }

    pub fn style(mut self, style: ComputedStyle) -> Self {
        self.style = style;
        self
    }

    pub fn display(mut self, display: &str) -> Self {
        self.style.display = display.to_string();
        self
    }

    pub fn visibility(mut self, visibility: &str) -> Self {
        self.style.visibility = visibility.to_string();
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.style.opacity = opacity;
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Marks the element as the root of a nested frame's content
    pub fn frame(mut self, frame_id: &str) -> Self {
        self.frame_id = Some(frame_id.to_string());
        self
    }

    pub fn backend_node_id(mut self, id: i64) -> Self {
        self.backend_node_id = Some(id);
        self
    }
}

/// Host page model
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Element>,
    root: NodeId,
    body: Option<NodeId>,
    frame_id: String,
    title: String,
    url: String,
    viewport: ViewportSize,
    scroll: ScrollPosition,
    ready_state: ReadyState,
    hub: EventHub,
}

/// A document shared between the tagger, the waiter and extraction calls
pub type SharedDocument = Arc<Mutex<Document>>;

impl Document {
    /// A loaded document with `<html>` and an empty `<body>`
    pub fn new(url: &str) -> Self {
        let mut doc = Self::without_body(url);
        let body = doc.push(ElementSpec::new("body").rect(0.0, 0.0, 1920.0, 1080.0));
        doc.link(doc.root, body, false);
        doc.body = Some(body);
        doc.ready_state = ReadyState::Complete;
        doc
    }

    /// A document that has not produced its body yet
    pub fn without_body(url: &str) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: None,
            frame_id: "main".to_string(),
            title: String::new(),
            url: url.to_string(),
            viewport: ViewportSize::default(),
            scroll: ScrollPosition::default(),
            ready_state: ReadyState::Loading,
            hub: EventHub::new(),
        };
        let root = doc.push(ElementSpec::new("html"));
        doc.nodes[root.0].connected = true;
        doc.root = root;
        doc
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    fn push(&mut self, spec: ElementSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Element {
            tag: spec.tag,
            attributes: spec.attributes,
            style: spec.style,
            rect: spec.rect,
            text: spec.text,
            parent: None,
            children: Vec::new(),
            shadow_children: None,
            in_shadow_root: false,
            frame_id: spec.frame_id,
            backend_node_id: spec.backend_node_id,
            connected: false,
        });
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId, shadow: bool) -> usize {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[child.0].in_shadow_root = shadow;
        if shadow {
            self.nodes[parent.0]
                .shadow_children
                .get_or_insert_with(Vec::new)
                .push(child);
        } else {
            self.nodes[parent.0].children.push(child);
        }
        let connected = self.nodes[parent.0].connected;
        let subtree = self.subtree_with_shadow(child);
        for node in &subtree {
            self.nodes[node.0].connected = connected;
        }
        subtree.len()
    }

    /// Insert a new element as the last light-DOM child of `parent`
    pub fn append(&mut self, parent: NodeId, spec: ElementSpec) -> NodeId {
        let child = self.push(spec);
        self.append_child(parent, child);
        child
    }

    /// Insert a new element into `host`'s shadow root, creating the root if needed
    pub fn append_shadow(&mut self, host: NodeId, spec: ElementSpec) -> NodeId {
        let child = self.push(spec);
        let added = self.link(host, child, true);
        self.notify_child_list(host, added, 0);
        child
    }

    /// Build a detached element, to be connected later with [`Document::append_child`]
    pub fn create_element(&mut self, spec: ElementSpec) -> NodeId {
        self.push(spec)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let added = self.link(parent, child, false);
        self.notify_child_list(parent, added, 0);
    }

    /// Disconnect `node` and its subtree. The ids stay valid but detached.
    pub fn remove(&mut self, node: NodeId) {
        let Some(parent) = self.nodes[node.0].parent else {
            return;
        };
        let was_connected = self.nodes[node.0].connected;
        self.nodes[parent.0].children.retain(|c| *c != node);
        if let Some(shadow) = self.nodes[parent.0].shadow_children.as_mut() {
            shadow.retain(|c| *c != node);
        }
        self.nodes[node.0].parent = None;
        let subtree = self.subtree_with_shadow(node);
        for n in &subtree {
            self.nodes[n.0].connected = false;
        }
        if was_connected {
            self.hub.publish(PageEvent::ChildList {
                target: Some(parent),
                added: 0,
                removed: subtree.len(),
            });
        }
    }

    fn notify_child_list(&self, target: NodeId, added: usize, removed: usize) {
        if self.nodes[target.0].connected {
            self.hub.publish(PageEvent::ChildList {
                target: Some(target),
                added,
                removed,
            });
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.nodes[node.0].set_attribute(name, value);
        if self.nodes[node.0].connected {
            self.hub.publish(PageEvent::Attributes {
                target: Some(node),
                name: name.to_ascii_lowercase(),
            });
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        self.nodes[node.0]
            .attributes
            .retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        if self.nodes[node.0].connected {
            self.hub.publish(PageEvent::Attributes {
                target: Some(node),
                name: name.to_ascii_lowercase(),
            });
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text = text.to_string();
        if self.nodes[node.0].connected {
            self.hub
                .publish(PageEvent::CharacterData { target: Some(node) });
        }
    }

    pub fn set_style(&mut self, node: NodeId, style: ComputedStyle) {
        self.nodes[node.0].style = style;
        if self.nodes[node.0].connected {
            self.hub.publish(PageEvent::Attributes {
                target: Some(node),
                name: "style".to_string(),
            });
        }
    }

    pub fn set_rect(&mut self, node: NodeId, rect: BoundingBox) {
        self.nodes[node.0].rect = rect;
    }

    pub fn element(&self, node: NodeId) -> &Element {
        &self.nodes[node.0]
    }

    pub fn get(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node.0)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0].attribute(name)
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub fn rect(&self, node: NodeId) -> BoundingBox {
        self.nodes[node.0].rect
    }

    /// Fails for nodes that are no longer part of the document
    pub fn computed_style(&self, node: NodeId) -> Result<&ComputedStyle, StyleError> {
        let el = &self.nodes[node.0];
        if el.connected {
            Ok(&el.style)
        } else {
            Err(StyleError::Detached(node))
        }
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.nodes[node.0].connected
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn shadow_children(&self, node: NodeId) -> Option<&[NodeId]> {
        self.nodes[node.0].shadow_children.as_deref()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// True when any ancestor boundary on the way up is a shadow root
    pub fn is_in_shadow_tree(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            let el = &self.nodes[n.0];
            if el.in_shadow_root {
                return true;
            }
            current = el.parent;
        }
        false
    }

    /// The frame that produced `node`
    pub fn frame_of(&self, node: NodeId) -> &str {
        let mut current = Some(node);
        while let Some(n) = current {
            if let Some(frame) = &self.nodes[n.0].frame_id {
                return frame;
            }
            current = self.nodes[n.0].parent;
        }
        &self.frame_id
    }

    /// Text of the element and its light-DOM descendants
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        for n in self.subtree(node) {
            let text = self.nodes[n.0].text.trim();
            if !text.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
        }
        out
    }

    pub fn find_by_backend_id(&self, backend_node_id: i64) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|el| el.backend_node_id == Some(backend_node_id))
            .map(NodeId)
    }

    /// Light-DOM subtree in document order, including `node` itself
    fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.nodes[n.0].children.iter().rev());
        }
        out
    }

    /// Like [`Document::subtree`] but also entering shadow roots, unbounded
    fn subtree_with_shadow(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            out.push(n);
            let el = &self.nodes[n.0];
            stack.extend(el.children.iter().rev());
            if let Some(shadow) = &el.shadow_children {
                stack.extend(shadow.iter().rev());
            }
        }
        out
    }

    /// Light-DOM descendants of `root` (exclusive), never entering shadow roots
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = self.subtree(root);
        out.remove(0);
        out
    }

    /// Descendants of `root` (exclusive), entering every attached shadow root.
    /// A host's shadow tree is visited before its light children.
    pub fn descendants_piercing(&self, root: NodeId) -> Result<Vec<NodeId>, TraversalError> {
        let mut out = Vec::new();
        self.pierce(root, 0, &mut out)?;
        Ok(out)
    }

    fn pierce(&self, node: NodeId, depth: usize, out: &mut Vec<NodeId>) -> Result<(), TraversalError> {
        if depth > MAX_PIERCE_DEPTH {
            return Err(TraversalError::DepthExceeded(MAX_PIERCE_DEPTH));
        }
        let el = &self.nodes[node.0];
        if let Some(shadow) = &el.shadow_children {
            for child in shadow {
                out.push(*child);
                self.pierce(*child, depth + 1, out)?;
            }
        }
        for child in &el.children {
            out.push(*child);
            self.pierce(*child, depth + 1, out)?;
        }
        Ok(())
    }

    /// Elements under `root` matching `selector`, crossing shadow boundaries.
    /// Falls back to a light-DOM query if the piercing traversal fails.
    pub fn query_selector_all(&self, root: NodeId, selector: &SelectorList) -> Vec<NodeId> {
        let candidates = match self.descendants_piercing(root) {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!("{}; falling back to light-DOM query", e);
                self.descendants(root)
            }
        };
        candidates
            .into_iter()
            .filter(|n| selector.matches(&self.nodes[n.0]))
            .collect()
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        let Some(body) = self.body else {
            return false;
        };
        self.descendants_piercing(body)
            .unwrap_or_else(|_| self.descendants(body))
            .iter()
            .any(|n| self.nodes[n.0].connected && self.nodes[n.0].text.contains(needle))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> Option<NodeId> {
        self.body
    }

    /// Attach a `<body>` to a document created with [`Document::without_body`]
    pub fn attach_body(&mut self, spec: ElementSpec) -> NodeId {
        let body = self.push(spec);
        self.link(self.root, body, false);
        self.body = Some(body);
        self.notify_child_list(self.root, 1, 0);
        body
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn set_frame_id(&mut self, frame_id: &str) {
        self.frame_id = frame_id.to_string();
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn set_ready_state(&mut self, state: ReadyState) {
        self.ready_state = state;
        self.hub.publish(PageEvent::ReadyState(state));
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn set_viewport(&mut self, viewport: ViewportSize) {
        self.viewport = viewport;
    }

    pub fn set_scroll(&mut self, scroll: ScrollPosition) {
        self.scroll = scroll;
    }

    pub fn metadata(&self) -> PageMetadata {
        PageMetadata {
            title: self.title.clone(),
            url: self.url.clone(),
            viewport: self.viewport,
            scroll: self.scroll,
        }
    }

    pub fn notify_request_started(&self, url: &str) {
        self.hub.publish(PageEvent::RequestStarted {
            url: url.to_string(),
        });
    }

    pub fn notify_resource_loaded(&self, url: &str) {
        self.hub.publish(PageEvent::ResourceLoaded {
            url: url.to_string(),
        });
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn event_feed(&self) -> EventFeed {
        self.hub.feed(self.body.is_some())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
#[path = "dom_test.rs"]
mod dom_test;
