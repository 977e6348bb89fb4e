//! Compact wire form and the payload size guard.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::PerceptionError;
use crate::fusion::HybridElement;
use crate::roles::role_code;
use crate::types::BoundingBox;

pub const MIB: usize = 1024 * 1024;

/// One element as the consumer sees it. Keys are single letters; see [`legend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticNode {
    /// Identifier: the stable id, or `b<backend>` for untagged nodes
    pub i: String,
    /// Abbreviated role code
    pub r: String,
    pub n: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub s: Vec<String>,
    /// Center `[x, y]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<[i64; 2]>,
    /// Box `[x, y, w, h]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<[i64; 4]>,
}

impl SemanticNode {
    pub fn with_bounds(mut self, rect: BoundingBox) -> Self {
        let center = rect.center();
        self.c = Some([center.x.round() as i64, center.y.round() as i64]);
        self.b = Some([
            rect.x.round() as i64,
            rect.y.round() as i64,
            rect.width.round() as i64,
            rect.height.round() as i64,
        ]);
        self
    }
}

const LEGEND: &str = "\
Keys: i=id r=role n=name v=value s=states c=center[x,y] b=box[x,y,w,h]
Roles: btn=button lnk=link inp=textbox/searchbox/spinbutton chk=checkbox/switch rad=radio \
sel=combobox/listbox opt=option sld=slider mnu=menuitem tab=tab itm=treeitem/gridcell gen=other
States: checked mixed expanded selected disabled pressed focused required
Coordinates are CSS pixels relative to the viewport.";

/// Human-readable key for the wire format
pub fn legend() -> &'static str {
    LEGEND
}

const STATE_ATTRIBUTES: &[(&str, &str)] = &[
    ("checked", "checked"),
    ("aria-checked", "checked"),
    ("aria-expanded", "expanded"),
    ("selected", "selected"),
    ("aria-selected", "selected"),
    ("disabled", "disabled"),
    ("aria-disabled", "disabled"),
    ("aria-pressed", "pressed"),
    ("required", "required"),
    ("aria-required", "required"),
];

fn states(element: &HybridElement) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |state: &str| {
        if !out.iter().any(|s| s == state) {
            out.push(state.to_string());
        }
    };

    if let Some(ax) = &element.ax {
        if ax.checked == Some(true) {
            push("checked");
        }
        if ax.expanded == Some(true) {
            push("expanded");
        }
        if ax.disabled == Some(true) {
            push("disabled");
        }
    }
    if let Some(dom) = &element.dom {
        for (attr, state) in STATE_ATTRIBUTES {
            match dom.attributes.get(*attr).map(String::as_str) {
                // Boolean attributes are present-or-absent; ARIA ones are "true"
                Some(v) if !attr.starts_with("aria-") || v == "true" => push(state),
                Some("mixed") => push("mixed"),
                _ => {}
            }
        }
    }
    out
}

/// Wire form of a fused element list
pub fn serialize(elements: &[HybridElement]) -> Vec<SemanticNode> {
    elements.iter().map(to_semantic).collect()
}

pub fn to_semantic(element: &HybridElement) -> SemanticNode {
    let node = SemanticNode {
        i: element.id.to_string(),
        r: role_code(&element.role).to_string(),
        n: element.name.clone(),
        v: element.value.clone().filter(|v| !v.is_empty()),
        s: states(element),
        c: None,
        b: None,
    };
    match element.bounds {
        Some(rect) if !rect.is_empty() => node.with_bounds(rect),
        _ => node,
    }
}

/// Rough token count for a serialized payload of `bytes` bytes
pub fn estimate_tokens(bytes: usize) -> usize {
    bytes.div_ceil(4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeLimits {
    /// Log a warning at or past this many bytes
    pub warn_bytes: usize,
    /// Reject payloads at or past this many bytes
    pub max_bytes: usize,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            warn_bytes: 3 * MIB,
            max_bytes: 4 * MIB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReport {
    pub bytes: usize,
    pub estimated_tokens: usize,
    pub warned: bool,
}

/// Check a serialized payload against the size ceiling. Sizes are UTF-8 bytes.
pub fn validate_size(payload: &str, limits: &SizeLimits) -> Result<SizeReport, PerceptionError> {
    let bytes = payload.len();
    if bytes >= limits.max_bytes {
        return Err(PerceptionError::PayloadTooLarge {
            actual_size: bytes,
            max_size: limits.max_bytes,
        });
    }

    let warned = bytes >= limits.warn_bytes;
    if warned {
        warn!(
            "Payload is {} bytes, approaching the {} byte limit",
            bytes, limits.max_bytes
        );
    }
    Ok(SizeReport {
        bytes,
        estimated_tokens: estimate_tokens(bytes),
        warned,
    })
}

#[cfg(test)]
#[path = "serializer_test.rs"]
mod serializer_test;
