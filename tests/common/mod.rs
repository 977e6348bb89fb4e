// Common test utilities and fixtures
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use pagesense::errors::{ProtocolCall, ProtocolError};
use pagesense::events::{EventFeed, EventHub, ReadyState};
use pagesense::scripts::{BODY_PRESENT_SCRIPT, METADATA_SCRIPT, READY_STATE_SCRIPT};
use pagesense::session::{AxNode, AxProperty, AxValue, DebugSession};
use pagesense::snapshot::DomSnapshot;
use pagesense::stability::PageProbe;
use serde_json::{Value, json};

/// A debug session answering from canned data
pub struct ScriptedSession {
    ax_nodes: Mutex<Result<Vec<AxNode>, ProtocolError>>,
    snapshot: Mutex<Result<DomSnapshot, ProtocolError>>,
    pub metadata: Value,
    /// Answer to the in-page DOM enumeration; `None` fails the call
    pub dom_elements: Option<Value>,
    /// Backend handles that still resolve to a live node
    pub live: HashSet<i64>,
    pub hub: EventHub,
    calls: Mutex<Vec<ProtocolCall>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            ax_nodes: Mutex::new(Ok(fixtures::ax_tree())),
            snapshot: Mutex::new(Ok(fixtures::snapshot())),
            metadata: fixtures::metadata(0.0),
            dom_elements: None,
            live: HashSet::from([3, 7]),
            hub: EventHub::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn without_accessibility(self) -> Self {
        self.break_accessibility();
        self
    }

    pub fn without_snapshot(self) -> Self {
        self.break_snapshot();
        self
    }

    /// Fail every accessibility tree request from now on
    pub fn break_accessibility(&self) {
        *self.ax_nodes.lock().unwrap() = Err(unsupported(ProtocolCall::GetFullAxTree));
    }

    /// Fail every snapshot request from now on
    pub fn break_snapshot(&self) {
        *self.snapshot.lock().unwrap() = Err(unsupported(ProtocolCall::CaptureSnapshot));
    }

    /// Answer later snapshot requests with `snapshot`
    pub fn set_snapshot(&self, snapshot: DomSnapshot) {
        *self.snapshot.lock().unwrap() = Ok(snapshot);
    }

    pub fn calls(&self) -> Vec<ProtocolCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ProtocolCall) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn unsupported(call: ProtocolCall) -> ProtocolError {
    ProtocolError::new(call, format!("'{}' wasn't found", call))
}

#[async_trait]
impl DebugSession for ScriptedSession {
    async fn enable_accessibility(&self) -> Result<(), ProtocolError> {
        self.record(ProtocolCall::EnableAccessibility);
        Ok(())
    }

    async fn full_accessibility_tree(&self) -> Result<Vec<AxNode>, ProtocolError> {
        self.record(ProtocolCall::GetFullAxTree);
        self.ax_nodes.lock().unwrap().clone()
    }

    async fn capture_snapshot(&self, _computed_styles: &[&str]) -> Result<DomSnapshot, ProtocolError> {
        self.record(ProtocolCall::CaptureSnapshot);
        self.snapshot.lock().unwrap().clone()
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, ProtocolError> {
        self.record(ProtocolCall::Evaluate);
        match expression {
            METADATA_SCRIPT => Ok(self.metadata.clone()),
            READY_STATE_SCRIPT => Ok(json!("complete")),
            BODY_PRESENT_SCRIPT => Ok(json!(true)),
            _ => self
                .dom_elements
                .clone()
                .ok_or_else(|| ProtocolError::new(ProtocolCall::Evaluate, "Execution context was destroyed")),
        }
    }

    async fn resolve_node(&self, backend_node_id: i64) -> Result<Option<String>, ProtocolError> {
        self.record(ProtocolCall::ResolveNode);
        Ok(self
            .live
            .contains(&backend_node_id)
            .then(|| format!("obj-{}", backend_node_id)))
    }
}

#[async_trait]
impl PageProbe for ScriptedSession {
    async fn has_selector(&self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn has_text(&self, _text: &str) -> Result<bool> {
        Ok(false)
    }

    async fn ready_state(&self) -> Result<ReadyState> {
        Ok(ReadyState::Complete)
    }

    async fn activity(&self) -> EventFeed {
        self.hub.feed(true)
    }
}

/// Canned page data
pub mod fixtures {
    use super::*;

    /// Buttons "Save" (backend 3) and "Far" (backend 5, below the fold),
    /// and a checkbox (backend 7)
    pub fn snapshot() -> DomSnapshot {
        serde_json::from_value(snapshot_json()).unwrap()
    }

    /// [`snapshot`] after a button (backend 9) was inserted into the body
    pub fn grown_snapshot() -> DomSnapshot {
        let mut raw = snapshot_json();
        let doc = &mut raw["documents"][0];
        let nodes = &mut doc["nodes"];
        for (key, value) in [
            ("parentIndex", json!(2)),
            ("nodeType", json!(1)),
            ("nodeName", json!(4)),
            ("nodeValue", json!(0)),
            ("backendNodeId", json!(9)),
            ("attributes", json!([])),
        ] {
            nodes[key].as_array_mut().unwrap().push(value);
        }
        let layout = &mut doc["layout"];
        layout["nodeIndex"].as_array_mut().unwrap().push(json!(8));
        layout["styles"].as_array_mut().unwrap().push(json!([11, 12, 13]));
        layout["bounds"].as_array_mut().unwrap().push(json!([100, 200, 100, 40]));
        serde_json::from_value(raw).unwrap()
    }

    fn snapshot_json() -> Value {
        json!({
            "strings": [
                "", "#document", "HTML", "BODY", "BUTTON", "#text", "Save", "Far",
                "INPUT", "type", "checkbox", "block", "visible", "1",
                "Example", "https://example.com/"
            ],
            "documents": [{
                "documentURL": 15,
                "title": 14,
                "nodes": {
                    "parentIndex": [-1, 0, 1, 2, 3, 2, 5, 2],
                    "nodeType": [9, 1, 1, 1, 3, 1, 3, 1],
                    "nodeName": [1, 2, 3, 4, 5, 4, 5, 8],
                    "nodeValue": [0, 0, 0, 0, 6, 0, 7, 0],
                    "backendNodeId": [100, 1, 2, 3, 4, 5, 6, 7],
                    "attributes": [[], [], [], [], [], [], [], [9, 10]]
                },
                "layout": {
                    "nodeIndex": [1, 2, 3, 5, 7],
                    "styles": [[11, 12, 13], [11, 12, 13], [11, 12, 13], [11, 12, 13], [11, 12, 13]],
                    "bounds": [
                        [0, 0, 1920, 3000],
                        [0, 0, 1920, 3000],
                        [100, 100, 100, 40],
                        [100, 2000, 100, 40],
                        [10, 10, 20, 20]
                    ]
                }
            }]
        })
    }

    fn ax(node_id: &str, role: &str, name: &str, backend: i64) -> AxNode {
        AxNode {
            node_id: node_id.to_string(),
            role: Some(AxValue::string("role", role)),
            name: Some(AxValue::string("computedString", name)),
            backend_dom_node_id: Some(backend),
            ..Default::default()
        }
    }

    pub fn ax_tree() -> Vec<AxNode> {
        vec![
            ax("1", "RootWebArea", "Example", 100),
            ax("2", "button", "Save", 3),
            ax("3", "button", "Far", 5),
            AxNode {
                properties: vec![AxProperty {
                    name: "checked".into(),
                    value: AxValue::boolean(true),
                }],
                ..ax("4", "checkbox", "Agree", 7)
            },
        ]
    }

    pub fn metadata(scroll_y: f64) -> Value {
        json!({
            "title": "Example",
            "url": "https://example.com/",
            "viewport": {"width": 1920, "height": 1080},
            "scroll": {"x": 0, "y": scroll_y}
        })
    }
}
