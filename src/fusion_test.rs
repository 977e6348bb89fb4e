use super::*;
use crate::dom::ElementSpec;
use crate::session::{AxProperty, AxValue};
use crate::tagger::TaggingContext;
use pretty_assertions::assert_eq;

fn ax(node_id: &str, role: &str, name: &str) -> SimplifiedAxElement {
    SimplifiedAxElement {
        node_id: node_id.to_string(),
        role: role.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

fn dom(index: usize, tag: &str, text: &str) -> DomElement {
    DomElement {
        index,
        tag: tag.to_string(),
        text: text.to_string(),
        rect: Some(BoundingBox::new(0.0, index as f64 * 40.0, 100.0, 30.0)),
        ..Default::default()
    }
}

#[test]
fn test_simplify_keeps_interactive_non_ignored_nodes() {
    let nodes = vec![
        AxNode {
            node_id: "1".into(),
            role: Some(AxValue::string("role", "button")),
            name: Some(AxValue::string("computedString", "Menu")),
            properties: vec![
                AxProperty {
                    name: "hasPopup".into(),
                    value: AxValue::string("token", "menu"),
                },
                AxProperty {
                    name: "expanded".into(),
                    value: AxValue::boolean(false),
                },
            ],
            backend_dom_node_id: Some(10),
            ..Default::default()
        },
        AxNode {
            node_id: "2".into(),
            ignored: true,
            role: Some(AxValue::string("role", "button")),
            ..Default::default()
        },
        AxNode {
            node_id: "3".into(),
            role: Some(AxValue::string("role", "heading")),
            ..Default::default()
        },
    ];

    let simplified = simplify_ax_tree(&nodes);
    assert_eq!(simplified.len(), 1);
    assert_eq!(simplified[0].name, "Menu");
    assert_eq!(simplified[0].has_popup.as_deref(), Some("menu"));
    assert_eq!(simplified[0].expanded, Some(false));
    assert_eq!(simplified[0].backend_node_id, Some(10));
}

#[test]
fn test_backend_handle_beats_attribute_match() {
    let ax_elements = vec![SimplifiedAxElement {
        backend_node_id: Some(7),
        ..ax("a1", "button", "Save")
    }];
    let dom_elements = vec![
        dom(0, "button", "Save"),
        DomElement {
            backend_node_id: Some(7),
            ..dom(1, "button", "Save draft")
        },
    ];

    let fused = select_elements_accessibility_first(&ax_elements, &dom_elements, None, &FusionConfig::default());
    assert_eq!(fused[0].dom.as_ref().unwrap().index, 1);
    assert_eq!(fused[0].provenance, Provenance::Hybrid);
    assert_eq!(fused[1].provenance, Provenance::Dom);
}

#[test]
fn test_explicit_mapping_takes_precedence() {
    let ax_elements = vec![ax("a1", "button", "Save")];
    let dom_elements = vec![dom(0, "button", "Save"), dom(1, "button", "Other")];
    let mapping = HashMap::from([("a1".to_string(), 1usize)]);

    let fused = select_elements_accessibility_first(
        &ax_elements,
        &dom_elements,
        Some(&mapping),
        &FusionConfig::default(),
    );
    assert_eq!(fused[0].dom.as_ref().unwrap().index, 1);
    // Accessibility name wins
    assert_eq!(fused[0].name, "Save");
}

#[test]
fn test_reordered_sources_match_by_attributes_not_index() {
    // The accessibility tree and the DOM query enumerate in different orders
    let ax_elements = vec![ax("a1", "button", "Cancel"), ax("a2", "button", "Save")];
    let dom_elements = vec![dom(0, "button", "Save"), dom(1, "button", "Cancel")];

    let fused = select_elements_accessibility_first(&ax_elements, &dom_elements, None, &FusionConfig::default());
    assert_eq!(fused.len(), 2);
    assert_eq!(fused[0].name, "Cancel");
    assert_eq!(fused[0].dom.as_ref().unwrap().text, "Cancel");
    assert_eq!(fused[1].name, "Save");
    assert_eq!(fused[1].dom.as_ref().unwrap().text, "Save");
    assert!(fused.iter().all(|f| f.provenance == Provenance::Hybrid));
}

#[test]
fn test_index_fallback_requires_same_role() {
    let ax_elements = vec![ax("a1", "button", ""), ax("a2", "checkbox", "")];
    let dom_elements = vec![dom(0, "button", "Go"), dom(1, "a", "Home")];

    let fused = select_elements_accessibility_first(&ax_elements, &dom_elements, None, &FusionConfig::default());
    assert_eq!(fused[0].provenance, Provenance::Hybrid);
    assert_eq!(fused[0].name, "Go");
    assert_eq!(fused[1].provenance, Provenance::Accessibility);
    assert_eq!(fused[2].provenance, Provenance::Dom);
    assert_eq!(fused[2].role, "link");
    assert_eq!(fused[2].name, "Home");
}

#[test]
fn test_dom_only_name_chain() {
    let mut labelled = dom(0, "input", "");
    labelled.attributes.insert("placeholder".into(), "Search".into());
    labelled.attributes.insert("aria-label".into(), "Site search".into());
    let mut placeholder_only = dom(1, "input", "");
    placeholder_only.attributes.insert("placeholder".into(), "Email".into());
    let mut named = dom(2, "input", "");
    named.attributes.insert("name".into(), "q".into());

    let fused = select_elements_accessibility_first(
        &[],
        &[labelled, placeholder_only, named],
        None,
        &FusionConfig::default(),
    );
    let names: Vec<&str> = fused.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Site search", "Email", "q"]);
    assert!(fused.iter().all(|f| f.role == "textbox" && f.interactive));
    assert_eq!(fused[0].attributes.get("label").map(String::as_str), Some("Site search"));
}

#[test]
fn test_prefer_dom_values_when_configured() {
    let ax_elements = vec![SimplifiedAxElement {
        value: Some("ax".into()),
        ..ax("a1", "textbox", "Query")
    }];
    let mut field = dom(0, "input", "");
    field.attributes.insert("aria-label".into(), "Query".into());
    field.attributes.insert("value".into(), "dom".into());
    field.attributes.insert("title".into(), "Search the site".into());

    let fused = select_elements_accessibility_first(&ax_elements, &[field.clone()], None, &FusionConfig::default());
    assert_eq!(fused[0].value.as_deref(), Some("ax"));
    assert_eq!(fused[0].attributes.get("value").map(String::as_str), Some("ax"));

    let config = FusionConfig {
        prefer_accessibility: false,
        ..Default::default()
    };
    let fused = select_elements_accessibility_first(&ax_elements, &[field], None, &config);
    assert_eq!(fused[0].value.as_deref(), Some("dom"));
    assert_eq!(fused[0].attributes.get("value").map(String::as_str), Some("dom"));
    assert_eq!(fused[0].description.as_deref(), Some("Search the site"));
}

#[test]
fn test_ids_reuse_stable_identities_and_stay_unique() {
    let ax_elements = vec![ax("a1", "button", "Save"), ax("a2", "link", "Docs")];
    let dom_elements = vec![
        DomElement {
            stable_id: Some(4),
            ..dom(0, "button", "Save")
        },
        DomElement {
            stable_id: Some(9),
            ..dom(1, "button", "Close")
        },
    ];

    let mut fused = select_elements_accessibility_first(&ax_elements, &dom_elements, None, &FusionConfig::default());
    let mut tagging = TaggingContext::new();
    assign_identities(&mut fused, &mut tagging);

    let ids: Vec<u64> = fused.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![4, 10, 9]);
    assert_eq!(tagging.next_id(), 11);
}

#[test]
fn test_identities_follow_backend_handles() {
    let mut tagging = TaggingContext::new();
    assert_eq!(tagging.id_for_backend(3), 1);
    assert_eq!(tagging.id_for_backend(7), 2);

    // In-page enumeration knows no handles; the accessibility side does
    let ax_elements = vec![
        SimplifiedAxElement {
            backend_node_id: Some(7),
            ..ax("a1", "checkbox", "Agree")
        },
        ax("a2", "link", "Docs"),
    ];
    let dom_elements = vec![
        DomElement {
            attributes: BTreeMap::from([("type".to_string(), "checkbox".to_string())]),
            ..dom(0, "input", "")
        },
        dom(1, "button", "Save"),
    ];
    let mut fused = select_elements_accessibility_first(&ax_elements, &dom_elements, None, &FusionConfig::default());
    assign_identities(&mut fused, &mut tagging);

    let summary: Vec<(u64, &str)> = fused.iter().map(|f| (f.id, f.name.as_str())).collect();
    assert_eq!(summary, vec![(2, "Agree"), (3, "Docs"), (4, "Save")]);
    assert_eq!(tagging.backend_node_for(2), Some(7));
    // Fresh ids without a handle stay unresolvable rather than borrowing one
    assert_eq!(tagging.backend_node_for(3), None);
    assert_eq!(tagging.backend_node_for(1), Some(3));
}

#[test]
fn test_collect_dom_elements_from_tagged_document() {
    let mut doc = Document::new("https://example.com");
    let body = doc.body().unwrap();
    doc.append(
        body,
        ElementSpec::new("button")
            .text("Buy")
            .rect(0.0, 0.0, 50.0, 20.0)
            .backend_node_id(3),
    );
    doc.append(body, ElementSpec::new("button").text("Ghost").display("none"));
    doc.append(
        body,
        ElementSpec::new("a")
            .attr("href", "/help")
            .text("Help")
            .rect(0.0, 30.0, 50.0, 20.0),
    );
    TaggingContext::new().ensure_stable_ids(&mut doc, None);

    let elements = collect_dom_elements(&doc);
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].index, 0);
    assert_eq!(elements[0].text, "Buy");
    assert_eq!(elements[0].stable_id, Some(1));
    assert_eq!(elements[0].backend_node_id, Some(3));
    assert_eq!(elements[1].inferred_role(), "link");
    assert_eq!(elements[1].stable_id, Some(2));
}

#[test]
fn test_coverage_bounds() {
    assert_eq!(analyze_coverage(&[], &[]), CoverageMetrics::default());

    let only_ax = analyze_coverage(&[ax("a1", "button", "Save")], &[]);
    assert_eq!(only_ax.ax_coverage, 100.0);
    assert_eq!(only_ax.ax_only, 1);

    let ax_elements = vec![
        ax("a1", "button", "Save"),
        ax("a2", "button", " save "),
        ax("a3", "link", "Docs"),
    ];
    let dom_elements = vec![
        dom(0, "button", "Save"),
        dom(1, "a", "Docs"),
        dom(2, "button", "Close"),
        dom(3, "button", "Open"),
    ];
    let metrics = analyze_coverage(&ax_elements, &dom_elements);
    assert_eq!(metrics.overlap, 2);
    assert_eq!(metrics.ax_only, 1);
    assert_eq!(metrics.dom_only, 2);
    assert_eq!(metrics.ax_coverage, 50.0);
    assert!((0.0..=100.0).contains(&metrics.ax_coverage));
}

#[test]
fn test_coverage_respects_backend_handles() {
    let ax_elements = vec![SimplifiedAxElement {
        backend_node_id: Some(1),
        ..ax("a1", "button", "Save")
    }];
    let dom_elements = vec![DomElement {
        backend_node_id: Some(2),
        ..dom(0, "button", "Save")
    }];
    assert_eq!(analyze_coverage(&ax_elements, &dom_elements).overlap, 0);
}
