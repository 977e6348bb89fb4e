use super::*;
use crate::dom::{Document, ElementSpec};

fn matches(selector: &str, spec: ElementSpec) -> bool {
    let mut doc = Document::new("about:blank");
    let body = doc.body().unwrap();
    let node = doc.append(body, spec);
    SelectorList::parse(selector)
        .unwrap()
        .matches(doc.element(node))
}

#[test]
fn test_tag_and_attribute_presence() {
    assert!(matches("a[href]", ElementSpec::new("a").attr("href", "/x")));
    assert!(!matches("a[href]", ElementSpec::new("a")));
    assert!(matches("BUTTON", ElementSpec::new("button")));
}

#[test]
fn test_attribute_equality_and_prefix() {
    assert!(matches(
        r#"[role="button"]"#,
        ElementSpec::new("div").attr("role", "button")
    ));
    assert!(!matches(
        r#"[role="button"]"#,
        ElementSpec::new("div").attr("role", "link")
    ));
    assert!(matches(
        "[data-x^='ab']",
        ElementSpec::new("div").attr("data-x", "abc")
    ));
}

#[test]
fn test_not_pseudo_class() {
    let focusable = r#"[tabindex]:not([tabindex^="-"])"#;
    assert!(matches(focusable, ElementSpec::new("div").attr("tabindex", "0")));
    assert!(matches(focusable, ElementSpec::new("div").attr("tabindex", "3")));
    assert!(!matches(focusable, ElementSpec::new("div").attr("tabindex", "-1")));
    assert!(!matches(focusable, ElementSpec::new("div")));
}

#[test]
fn test_id_and_class() {
    let spec = ElementSpec::new("div")
        .attr("id", "main")
        .attr("class", "card primary");
    assert!(matches("#main", spec.clone()));
    assert!(matches("div.primary", spec.clone()));
    assert!(!matches(".secondary", spec));
}

#[test]
fn test_selector_lists() {
    let list = "input, textarea, select";
    assert!(matches(list, ElementSpec::new("textarea")));
    assert!(!matches(list, ElementSpec::new("div")));
}

#[test]
fn test_rejects_combinators_and_garbage() {
    assert!(SelectorList::parse("div a").is_err());
    assert!(SelectorList::parse("ul > li").is_err());
    assert!(SelectorList::parse("").is_err());
    assert!(SelectorList::parse("a,").is_err());
    assert!(SelectorList::parse(r#"[role="button]"#).is_err());
    assert!(SelectorList::parse("a:hover").is_err());
}
