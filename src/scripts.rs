//! JavaScript evaluated in the page through the debug session.

use crate::tagger::INTERACTIVE_SELECTORS;

/// Viewport, scroll offset, title and URL. Shape matches [`crate::types::PageMetadata`].
pub const METADATA_SCRIPT: &str = r#"
(() => ({
    title: document.title || "",
    url: location.href,
    viewport: { width: window.innerWidth, height: window.innerHeight },
    scroll: { x: window.scrollX, y: window.scrollY }
}))()
"#;

pub const READY_STATE_SCRIPT: &str = "document.readyState";

pub const BODY_PRESENT_SCRIPT: &str = "!!document.body";

/// Interactive, visible elements across open shadow roots. Shape matches
/// [`crate::fusion::DomElement`].
const DOM_COLLECTION_TEMPLATE: &str = r#"
(() => {
    const SELECTOR = __SELECTOR__;
    const MAX_DEPTH = 256;
    const found = [];
    const visible = (el) => {
        const style = getComputedStyle(el);
        if (style.display === "none" || style.visibility === "hidden" || parseFloat(style.opacity) === 0) return false;
        if (el.getAttribute("aria-hidden") === "true" || el.hasAttribute("hidden")) return false;
        if (el.tagName === "INPUT" && (el.getAttribute("type") || "").toLowerCase() === "hidden") return false;
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0;
    };
    const visit = (root, depth) => {
        if (depth > MAX_DEPTH) return;
        for (const el of root.querySelectorAll("*")) {
            if (el.matches(SELECTOR) && visible(el)) found.push(el);
            if (el.shadowRoot) visit(el.shadowRoot, depth + 1);
        }
    };
    try {
        visit(document, 0);
    } catch (e) {
        found.length = 0;
        for (const el of document.querySelectorAll(SELECTOR)) if (visible(el)) found.push(el);
    }
    return found.map((el, index) => {
        const r = el.getBoundingClientRect();
        const attributes = {};
        for (const a of el.attributes) attributes[a.name] = a.value;
        const id = el.getAttribute("data-ps-id");
        return {
            index,
            tag: el.tagName.toLowerCase(),
            attributes,
            text: (el.innerText || el.textContent || "").trim().slice(0, 200),
            rect: { x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height },
            stableId: id === null ? null : Number(id)
        };
    });
})()
"#;

pub fn dom_collection_script() -> String {
    let selector = serde_json::Value::String(INTERACTIVE_SELECTORS.join(", ")).to_string();
    DOM_COLLECTION_TEMPLATE.replace("__SELECTOR__", &selector)
}

pub fn selector_probe(selector: &str) -> String {
    format!(
        "!!document.querySelector({})",
        serde_json::Value::String(selector.to_string())
    )
}

pub fn text_probe(text: &str) -> String {
    format!(
        "!!(document.body && document.body.innerText.includes({}))",
        serde_json::Value::String(text.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probes_escape_their_arguments() {
        assert_eq!(
            selector_probe(r#"a[title="x"]"#),
            r#"!!document.querySelector("a[title=\"x\"]")"#
        );
        assert!(text_probe("it's \"done\"").contains(r#""it's \"done\"""#));
    }

    #[test]
    fn test_collection_script_embeds_selector() {
        let script = dom_collection_script();
        assert!(!script.contains("__SELECTOR__"));
        assert!(script.contains(r#"a[href], button"#));
        assert!(script.contains(r#"[tabindex]:not([tabindex^=\"-\"])"#));
    }
}
