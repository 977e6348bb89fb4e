//! Accessibility-first fusion of the accessibility tree with direct DOM
//! queries, and coverage statistics between the two sources.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::roles::{infer_role, is_interactive_role};
use crate::session::AxNode;
use crate::tagger::{TaggingContext, interactive_selector, is_visible, stable_id};
use crate::types::BoundingBox;

/// Attributes carried into [`HybridElement::attributes`]
pub const MERGE_ATTRIBUTES: &[&str] = &[
    "label",
    "name",
    "type",
    "placeholder",
    "value",
    "role",
    "title",
    "aria-haspopup",
    "aria-expanded",
];

const MAX_TEXT_LENGTH: usize = 200;

/// Interactive accessibility node, flattened
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedAxElement {
    pub node_id: String,
    pub role: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_popup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

/// Keep non-ignored nodes with an interactive role
pub fn simplify_ax_tree(nodes: &[AxNode]) -> Vec<SimplifiedAxElement> {
    nodes
        .iter()
        .filter(|node| !node.ignored)
        .filter_map(|node| {
            let role = node.role()?;
            if !is_interactive_role(&role) {
                return None;
            }
            Some(SimplifiedAxElement {
                node_id: node.node_id.clone(),
                role,
                name: node.name().unwrap_or_default(),
                description: node.description(),
                value: node.value_text(),
                backend_node_id: node.backend_dom_node_id,
                has_popup: node
                    .property("hasPopup")
                    .and_then(|v| v.as_text())
                    .filter(|v| v != "false"),
                expanded: node.flag("expanded"),
                checked: node.flag("checked"),
                disabled: node.flag("disabled"),
            })
        })
        .collect()
}

/// An interactive element found by querying the DOM directly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomElement {
    /// Position in the enumeration
    pub index: usize,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub rect: Option<BoundingBox>,
    pub stable_id: Option<u64>,
    pub backend_node_id: Option<i64>,
}

impl DomElement {
    pub fn inferred_role(&self) -> String {
        infer_role(
            &self.tag,
            self.attributes.get("role").map(String::as_str),
            self.attributes.get("type").map(String::as_str),
        )
    }

    /// Label (`aria-label`, `label`), then `name`, then `placeholder`, then text
    pub fn accessible_name(&self) -> String {
        ["aria-label", "label", "name", "placeholder"]
            .iter()
            .filter_map(|attr| self.attributes.get(*attr))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .unwrap_or(self.text.trim())
            .to_string()
    }

    fn label(&self) -> Option<&String> {
        self.attributes
            .get("aria-label")
            .or_else(|| self.attributes.get("label"))
    }
}

fn dom_element(doc: &Document, node: NodeId, index: usize) -> DomElement {
    let el = doc.element(node);
    let rect = el.rect();
    DomElement {
        index,
        tag: el.tag().to_string(),
        attributes: el
            .attributes()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        text: doc.text_content(node).chars().take(MAX_TEXT_LENGTH).collect(),
        rect: (!rect.is_empty()).then_some(rect),
        stable_id: stable_id(doc, node),
        backend_node_id: el.backend_node_id(),
    }
}

/// Visible interactive elements of `doc`, in traversal order
pub fn collect_dom_elements(doc: &Document) -> Vec<DomElement> {
    let selector = interactive_selector();
    doc.query_selector_all(doc.root(), &selector)
        .into_iter()
        .filter(|node| is_visible(doc, *node))
        .enumerate()
        .map(|(index, node)| dom_element(doc, node, index))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Accessibility,
    Dom,
    Hybrid,
}

/// One element of the fused model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridElement {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ax: Option<SimplifiedAxElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom: Option<DomElement>,
    pub role: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub interactive: bool,
    pub attributes: BTreeMap<String, String>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

impl HybridElement {
    fn stamped_id(&self) -> Option<u64> {
        self.dom.as_ref().and_then(|d| d.stable_id)
    }

    /// Backend handle from either source, DOM first
    pub fn backend_node_id(&self) -> Option<i64> {
        self.dom
            .as_ref()
            .and_then(|d| d.backend_node_id)
            .or_else(|| self.ax.as_ref().and_then(|a| a.backend_node_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Accessibility values win over DOM values when both exist
    pub prefer_accessibility: bool,
    /// Append DOM elements no accessibility node claimed
    pub include_dom_only: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            prefer_accessibility: true,
            include_dom_only: true,
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Different backend handles on both sides rule out a pairing
fn handles_compatible(ax: Option<i64>, dom: Option<i64>) -> bool {
    match (ax, dom) {
        (Some(a), Some(d)) => a == d,
        _ => true,
    }
}

struct Matcher<'a> {
    dom: &'a [DomElement],
    used: Vec<bool>,
    by_backend: HashMap<i64, usize>,
    by_index: HashMap<usize, usize>,
}

impl<'a> Matcher<'a> {
    fn new(dom: &'a [DomElement]) -> Self {
        Self {
            dom,
            used: vec![false; dom.len()],
            by_backend: dom
                .iter()
                .enumerate()
                .filter_map(|(pos, el)| el.backend_node_id.map(|b| (b, pos)))
                .collect(),
            by_index: dom.iter().enumerate().map(|(pos, el)| (el.index, pos)).collect(),
        }
    }

    fn free(&self, pos: usize) -> Option<usize> {
        (!self.used[pos]).then_some(pos)
    }

    fn explicit(&self, ax: &SimplifiedAxElement, mapping: Option<&HashMap<String, usize>>) -> Option<usize> {
        let index = mapping?.get(&ax.node_id)?;
        self.free(*self.by_index.get(index)?)
    }

    fn by_handle(&self, ax: &SimplifiedAxElement) -> Option<usize> {
        self.free(*self.by_backend.get(&ax.backend_node_id?)?)
    }

    /// Same role and name; the same enumeration index only breaks ties
    fn by_attributes(&self, ax: &SimplifiedAxElement, ax_index: usize) -> Option<usize> {
        let name = normalize_name(&ax.name);
        if name.is_empty() {
            return None;
        }
        let candidates: Vec<usize> = (0..self.dom.len())
            .filter(|pos| !self.used[*pos])
            .filter(|pos| {
                let el = &self.dom[*pos];
                handles_compatible(ax.backend_node_id, el.backend_node_id)
                    && el.inferred_role() == ax.role
                    && normalize_name(&el.accessible_name()) == name
            })
            .collect();
        candidates
            .iter()
            .copied()
            .find(|pos| self.dom[*pos].index == ax_index)
            .or_else(|| candidates.first().copied())
    }

    /// Weakest rule: the unused element at the same index, if its role agrees
    fn by_index(&self, ax: &SimplifiedAxElement, ax_index: usize) -> Option<usize> {
        let pos = self.free(*self.by_index.get(&ax_index)?)?;
        let el = &self.dom[pos];
        (handles_compatible(ax.backend_node_id, el.backend_node_id) && el.inferred_role() == ax.role)
            .then_some(pos)
    }

    fn claim(
        &mut self,
        ax: &SimplifiedAxElement,
        ax_index: usize,
        mapping: Option<&HashMap<String, usize>>,
    ) -> Option<usize> {
        let pos = self
            .explicit(ax, mapping)
            .or_else(|| self.by_handle(ax))
            .or_else(|| self.by_attributes(ax, ax_index))
            .or_else(|| self.by_index(ax, ax_index))?;
        self.used[pos] = true;
        Some(pos)
    }
}

fn dom_attributes(dom: &DomElement) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for key in MERGE_ATTRIBUTES {
        let value = match *key {
            "label" => dom.label(),
            other => dom.attributes.get(other),
        };
        if let Some(value) = value {
            out.insert(key.to_string(), value.clone());
        }
    }
    out
}

fn ax_attributes(ax: &SimplifiedAxElement) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert("role".to_string(), ax.role.clone());
    if !ax.name.is_empty() {
        out.insert("label".to_string(), ax.name.clone());
    }
    if let Some(value) = &ax.value {
        out.insert("value".to_string(), value.clone());
    }
    if let Some(popup) = &ax.has_popup {
        out.insert("aria-haspopup".to_string(), popup.clone());
    }
    if let Some(expanded) = ax.expanded {
        out.insert("aria-expanded".to_string(), expanded.to_string());
    }
    out
}

fn pick(preferred: Option<String>, other: Option<String>) -> Option<String> {
    preferred.filter(|v| !v.is_empty()).or(other.filter(|v| !v.is_empty()))
}

fn fuse(ax: Option<&SimplifiedAxElement>, dom: Option<&DomElement>, config: &FusionConfig) -> HybridElement {
    let ax_role = ax.map(|a| a.role.clone());
    let dom_role = dom.map(DomElement::inferred_role);
    let ax_name = ax.map(|a| a.name.clone());
    let dom_name = dom.map(DomElement::accessible_name);
    let ax_value = ax.and_then(|a| a.value.clone());
    let dom_value = dom.and_then(|d| d.attributes.get("value").cloned());
    let ax_description = ax.and_then(|a| a.description.clone());
    let dom_description = dom.and_then(|d| d.attributes.get("title").cloned());

    let (role, name, value, description) = if config.prefer_accessibility {
        (
            pick(ax_role, dom_role),
            pick(ax_name, dom_name),
            pick(ax_value, dom_value),
            pick(ax_description, dom_description),
        )
    } else {
        (
            pick(dom_role, ax_role),
            pick(dom_name, ax_name),
            pick(dom_value, ax_value),
            pick(dom_description, ax_description),
        )
    };
    let role = role.unwrap_or_else(|| "generic".to_string());

    let (mut attributes, overlay) = match (ax, dom) {
        (Some(a), Some(d)) if config.prefer_accessibility => (dom_attributes(d), ax_attributes(a)),
        (Some(a), Some(d)) => (ax_attributes(a), dom_attributes(d)),
        (Some(a), None) => (ax_attributes(a), BTreeMap::new()),
        (None, Some(d)) => (dom_attributes(d), BTreeMap::new()),
        (None, None) => (BTreeMap::new(), BTreeMap::new()),
    };
    attributes.extend(overlay);

    let provenance = match (ax, dom) {
        (Some(_), Some(_)) => Provenance::Hybrid,
        (None, Some(_)) => Provenance::Dom,
        _ => Provenance::Accessibility,
    };

    HybridElement {
        id: 0,
        ax: ax.cloned(),
        dom: dom.cloned(),
        interactive: dom.is_some() || is_interactive_role(&role),
        role,
        name: name.unwrap_or_default(),
        description,
        value,
        attributes,
        provenance,
        bounds: dom.and_then(|d| d.rect).filter(|r| !r.is_empty()),
    }
}

/// Fuse both sources, accessibility first. `mapping` pins AX node ids to
/// DOM enumeration indexes and takes precedence over every other rule.
/// Ids are left at 0 until [`assign_identities`] runs.
pub fn select_elements_accessibility_first(
    ax: &[SimplifiedAxElement],
    dom: &[DomElement],
    mapping: Option<&HashMap<String, usize>>,
    config: &FusionConfig,
) -> Vec<HybridElement> {
    let mut matcher = Matcher::new(dom);
    let mut out = Vec::with_capacity(ax.len() + dom.len());

    for (ax_index, ax_el) in ax.iter().enumerate() {
        let counterpart = matcher.claim(ax_el, ax_index, mapping).map(|pos| &dom[pos]);
        out.push(fuse(Some(ax_el), counterpart, config));
    }
    if config.include_dom_only {
        for (pos, dom_el) in dom.iter().enumerate() {
            if !matcher.used[pos] {
                out.push(fuse(None, Some(dom_el), config));
            }
        }
    }

    debug!(
        "Fused {} accessibility and {} DOM elements into {}",
        ax.len(),
        dom.len(),
        out.len()
    );
    out
}

/// Number fused elements in the tagger's id space.
///
/// Stamped ids are kept. Elements with a backend handle get the id
/// registered for it, so they resolve back to the same node. The rest get
/// fresh ids that can never collide with an earlier assignment.
pub fn assign_identities(elements: &mut [HybridElement], tagging: &mut TaggingContext) {
    for id in elements.iter().filter_map(HybridElement::stamped_id) {
        tagging.observe(id);
    }

    let mut taken = HashSet::new();
    for element in elements.iter_mut() {
        let candidate = element
            .stamped_id()
            .or_else(|| element.backend_node_id().map(|b| tagging.id_for_backend(b)));
        element.id = match candidate {
            Some(id) if taken.insert(id) => id,
            _ => {
                let id = tagging.fresh_id();
                taken.insert(id);
                id
            }
        };
    }
}

/// Overlap between the accessibility and DOM views of a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageMetrics {
    pub ax_only: usize,
    pub dom_only: usize,
    pub overlap: usize,
    pub total_ax: usize,
    pub total_dom: usize,
    /// Share of DOM elements the accessibility tree also reports, 0..=100
    pub ax_coverage: f64,
}

struct CoverageKey {
    role: String,
    name: String,
    backend: Option<i64>,
}

impl CoverageKey {
    /// Backend handles only take part when both sides carry one
    fn matches(&self, other: &CoverageKey) -> bool {
        self.role == other.role
            && self.name == other.name
            && handles_compatible(self.backend, other.backend)
    }
}

pub fn analyze_coverage(ax: &[SimplifiedAxElement], dom: &[DomElement]) -> CoverageMetrics {
    let ax_keys: Vec<CoverageKey> = ax
        .iter()
        .map(|a| CoverageKey {
            role: a.role.clone(),
            name: normalize_name(&a.name),
            backend: a.backend_node_id,
        })
        .collect();
    let dom_keys: Vec<CoverageKey> = dom
        .iter()
        .map(|d| CoverageKey {
            role: d.inferred_role(),
            name: normalize_name(&d.accessible_name()),
            backend: d.backend_node_id,
        })
        .collect();

    let mut dom_used = vec![false; dom_keys.len()];
    let mut overlap = 0;
    for key in &ax_keys {
        if let Some(pos) = (0..dom_keys.len()).find(|p| !dom_used[*p] && key.matches(&dom_keys[*p])) {
            dom_used[pos] = true;
            overlap += 1;
        }
    }

    let total_ax = ax_keys.len();
    let total_dom = dom_keys.len();
    let ax_coverage = match (total_ax, total_dom) {
        (0, 0) => 0.0,
        (_, 0) => 100.0,
        _ => (overlap as f64 / total_dom as f64 * 100.0).clamp(0.0, 100.0),
    };

    CoverageMetrics {
        ax_only: total_ax - overlap,
        dom_only: total_dom - overlap,
        overlap,
        total_ax,
        total_dom,
        ax_coverage,
    }
}

#[cfg(test)]
#[path = "fusion_test.rs"]
mod fusion_test;
