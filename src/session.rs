//! The remote-debugging capability the perception layer drives.
//!
//! Everything the extractor needs from a browser goes through
//! [`DebugSession`]. The live implementation is [`crate::cdp::CdpSession`];
//! tests script their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::snapshot::DomSnapshot;

/// A typed protocol value (`{"type": "...", "value": ...}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxValue {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl AxValue {
    pub fn string(kind: &str, value: &str) -> Self {
        Self {
            kind: kind.to_string(),
            value: Some(Value::String(value.to_string())),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            kind: "boolean".to_string(),
            value: Some(Value::Bool(value)),
        }
    }

    /// Non-empty textual form of the value
    pub fn as_text(&self) -> Option<String> {
        let text = match self.value.as_ref()? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// Boolean and tristate values; `"mixed"` is not a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self.value.as_ref()? {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s == "true" => Some(true),
            Value::String(s) if s == "false" => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxProperty {
    pub name: String,
    pub value: AxValue,
}

/// One node of the accessibility tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AxValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AxValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<AxValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AxValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<AxProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<String>,
    #[serde(
        rename = "backendDOMNodeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub backend_dom_node_id: Option<i64>,
}

impl AxNode {
    /// Lowercased role, if the node has one
    pub fn role(&self) -> Option<String> {
        self.role
            .as_ref()
            .and_then(AxValue::as_text)
            .map(|r| r.to_ascii_lowercase())
    }

    pub fn name(&self) -> Option<String> {
        self.name.as_ref().and_then(AxValue::as_text)
    }

    pub fn description(&self) -> Option<String> {
        self.description.as_ref().and_then(AxValue::as_text)
    }

    pub fn value_text(&self) -> Option<String> {
        self.value.as_ref().and_then(AxValue::as_text)
    }

    pub fn property(&self, name: &str) -> Option<&AxValue> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| &p.value)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.property(name).and_then(AxValue::as_bool)
    }
}

/// Commands the perception layer issues against one page
#[async_trait]
pub trait DebugSession: Send + Sync {
    async fn enable_accessibility(&self) -> Result<(), ProtocolError>;

    async fn full_accessibility_tree(&self) -> Result<Vec<AxNode>, ProtocolError>;

    /// DOM and layout snapshot including the named computed styles
    async fn capture_snapshot(&self, computed_styles: &[&str]) -> Result<DomSnapshot, ProtocolError>;

    /// Evaluate an expression in the page and return its JSON value
    async fn evaluate(&self, expression: &str) -> Result<Value, ProtocolError>;

    /// Live object reference for a backend node, `None` if the node is gone
    async fn resolve_node(&self, backend_node_id: i64) -> Result<Option<String>, ProtocolError>;
}
