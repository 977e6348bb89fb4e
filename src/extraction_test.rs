use super::*;
use crate::session::{AxProperty, AxValue};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

struct MockSession {
    ax_nodes: Vec<AxNode>,
    snapshot: DomSnapshot,
    metadata: Value,
    fail_accessibility: bool,
}

#[async_trait]
impl DebugSession for MockSession {
    async fn enable_accessibility(&self) -> Result<(), ProtocolError> {
        if self.fail_accessibility {
            return Err(ProtocolError::new(
                ProtocolCall::EnableAccessibility,
                "'Accessibility.enable' wasn't found",
            ));
        }
        Ok(())
    }

    async fn full_accessibility_tree(&self) -> Result<Vec<AxNode>, ProtocolError> {
        Ok(self.ax_nodes.clone())
    }

    async fn capture_snapshot(&self, _computed_styles: &[&str]) -> Result<DomSnapshot, ProtocolError> {
        Ok(self.snapshot.clone())
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value, ProtocolError> {
        Ok(self.metadata.clone())
    }

    async fn resolve_node(&self, backend_node_id: i64) -> Result<Option<String>, ProtocolError> {
        match backend_node_id {
            3 => Ok(Some("obj-3".to_string())),
            404 => Err(ProtocolError::new(
                ProtocolCall::ResolveNode,
                "No node with given id found",
            )),
            500 => Err(ProtocolError::new(ProtocolCall::ResolveNode, "Target closed")),
            _ => Ok(None),
        }
    }
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

/// Two buttons, one far below the fold, and a checkbox
fn snapshot() -> DomSnapshot {
    serde_json::from_value(json!({
        "strings": [
            "", "#document", "HTML", "BODY", "BUTTON", "INPUT", "type", "checkbox",
            "block", "visible", "1", "Example", "https://example.com/"
        ],
        "documents": [{
            "documentURL": 12,
            "title": 11,
            "nodes": {
                "parentIndex": [-1, 0, 1, 2, 2, 2],
                "nodeType": [9, 1, 1, 1, 1, 1],
                "nodeName": [1, 2, 3, 4, 4, 5],
                "backendNodeId": [100, 1, 2, 3, 4, 5],
                "attributes": [[], [], [], [], [], [6, 7]]
            },
            "layout": {
                "nodeIndex": [1, 2, 3, 4, 5],
                "styles": [[8, 9, 10], [8, 9, 10], [8, 9, 10], [8, 9, 10], [8, 9, 10]],
                "bounds": [
                    [0, 0, 1920, 3000],
                    [0, 0, 1920, 3000],
                    [100, 100, 100, 40],
                    [100, 2000, 100, 40],
                    [10, 10, 20, 20]
                ]
            }
        }]
    }))
    .unwrap()
}

fn ax_tree() -> Vec<AxNode> {
    vec![
        ax("1", "RootWebArea", "Example", 100),
        ax("2", "button", "Save", 3),
        ax("3", "button", "Far", 4),
        AxNode {
            properties: vec![
                AxProperty {
                    name: "checked".into(),
                    value: AxValue::string("tristate", "mixed"),
                },
                AxProperty {
                    name: "focused".into(),
                    value: AxValue::boolean(true),
                },
                AxProperty {
                    name: "disabled".into(),
                    value: AxValue::boolean(false),
                },
            ],
            ..ax("4", "checkbox", "Agree", 5)
        },
        AxNode {
            ignored: true,
            ..ax("5", "button", "Save", 3)
        },
        // No layout box
        ax("6", "link", "Ghost", 99),
    ]
}

fn metadata(scroll_y: f64) -> Value {
    json!({
        "title": "Example",
        "url": "https://example.com/",
        "viewport": {"width": 1920, "height": 1080},
        "scroll": {"x": 0, "y": scroll_y}
    })
}

fn session() -> MockSession {
    MockSession {
        ax_nodes: ax_tree(),
        snapshot: snapshot(),
        metadata: metadata(0.0),
        fail_accessibility: false,
    }
}

#[tokio::test]
async fn test_extract_prunes_to_viewport() {
    let mut tagging = TaggingContext::new();
    let result = ProtocolExtractor::default()
        .extract(&session(), &mut tagging)
        .await
        .unwrap();

    assert_eq!(
        result.nodes,
        vec![
            SemanticNode {
                i: "1".into(),
                r: "btn".into(),
                n: "Save".into(),
                v: None,
                s: vec![],
                c: Some([150, 120]),
                b: Some([100, 100, 100, 40]),
            },
            SemanticNode {
                i: "3".into(),
                r: "chk".into(),
                n: "Agree".into(),
                v: None,
                s: vec!["mixed".into(), "focused".into()],
                c: Some([20, 20]),
                b: Some([10, 10, 20, 20]),
            },
        ]
    );
    assert_eq!(result.title, "Example");
    assert_eq!(result.url, "https://example.com/");
    assert_eq!(result.viewport, ViewportSize::default());
    assert_eq!(result.meta.node_count, 2);
    assert_eq!(result.meta.ax_node_count, 6);
    let bytes = serde_json::to_vec(&result.nodes).unwrap().len();
    assert_eq!(result.meta.estimated_tokens, bytes.div_ceil(4));

    // The far button is tagged even though it was pruned
    assert_eq!(tagging.backend_node_for(2), Some(4));
}

#[tokio::test]
async fn test_scrolled_coordinates_are_viewport_relative() {
    let session = MockSession {
        metadata: metadata(1950.0),
        ..session()
    };
    let result = ProtocolExtractor::default()
        .extract(&session, &mut TaggingContext::new())
        .await
        .unwrap();

    assert_eq!(result.nodes.len(), 1);
    assert_eq!(result.nodes[0].n, "Far");
    assert_eq!(result.nodes[0].b, Some([100, 50, 100, 40]));
    assert_eq!(result.scroll.y, 1950.0);
}

#[tokio::test]
async fn test_full_page_extraction_and_options() {
    let config = ExtractionConfig {
        viewport_only: false,
        include_bounds: false,
        max_name_length: 3,
        ..Default::default()
    };
    let result = ProtocolExtractor::new(config)
        .extract(&session(), &mut TaggingContext::new())
        .await
        .unwrap();

    let names: Vec<&str> = result.nodes.iter().map(|n| n.n.as_str()).collect();
    assert_eq!(names, vec!["Sav", "Far", "Agr"]);
    assert!(result.nodes.iter().all(|n| n.b.is_none() && n.c.is_some()));
}

#[tokio::test]
async fn test_ids_survive_repeated_extractions() {
    let extractor = ProtocolExtractor::default();
    let mut tagging = TaggingContext::new();
    let first = extractor.extract(&session(), &mut tagging).await.unwrap();
    let second = extractor.extract(&session(), &mut tagging).await.unwrap();

    let ids = |r: &ExtractionResult| r.nodes.iter().map(|n| n.i.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(tagging.next_id(), 4);
}

#[test]
fn test_untagged_nodes_use_backend_identifier() {
    let mut session = session();
    // A slider the tagger's selector does not cover
    session.ax_nodes.push(ax("7", "slider", "Volume", 3));
    let extractor = ProtocolExtractor::new(ExtractionConfig {
        viewport_only: false,
        ..Default::default()
    });
    let layout = session.snapshot.layout_by_backend();
    let metadata: PageMetadata = serde_json::from_value(metadata(0.0)).unwrap();
    let nodes = extractor.correlate(&session.ax_nodes, &layout, &HashMap::new(), &metadata);

    assert!(nodes.iter().all(|n| n.i.starts_with('b')));
    assert_eq!(nodes.last().unwrap().i, "b3");
    assert_eq!(nodes.last().unwrap().r, "sld");
}

#[tokio::test]
async fn test_protocol_failure_aborts_extraction() {
    let session = MockSession {
        fail_accessibility: true,
        ..session()
    };
    let err = ProtocolExtractor::default()
        .extract(&session, &mut TaggingContext::new())
        .await
        .unwrap_err();
    assert!(err.is_protocol_failure());
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_malformed_metadata_is_a_protocol_failure() {
    let session = MockSession {
        metadata: json!("not an object"),
        ..session()
    };
    match ProtocolExtractor::default()
        .extract(&session, &mut TaggingContext::new())
        .await
    {
        Err(PerceptionError::Protocol(e)) => assert_eq!(e.call, ProtocolCall::Evaluate),
        other => panic!("expected a protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_resolve_backend_node() {
    let session = session();
    assert_eq!(resolve_backend_node(&session, 3).await.unwrap(), "obj-3");

    for gone in [7, 404] {
        let err = resolve_backend_node(&session, gone).await.unwrap_err();
        assert!(matches!(err, PerceptionError::Resolution { backend_node_id } if backend_node_id == gone));
        assert_eq!(err.exit_code(), 2);
    }

    let err = resolve_backend_node(&session, 500).await.unwrap_err();
    assert!(err.is_protocol_failure());
}
