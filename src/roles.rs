//! Role vocabulary tables.
//!
//! Role handling is data, not control flow: the interactive role set, the
//! role → wire code abbreviations, and the ordered tag → role inference rules
//! all live in the tables below.

/// Accessibility roles treated as interactive
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "searchbox",
    "checkbox",
    "radio",
    "combobox",
    "listbox",
    "option",
    "slider",
    "spinbutton",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "switch",
    "treeitem",
    "gridcell",
];

/// Role → abbreviated wire code. Anything not listed is `gen`.
pub const ROLE_CODES: &[(&str, &str)] = &[
    ("button", "btn"),
    ("link", "lnk"),
    ("textbox", "inp"),
    ("searchbox", "inp"),
    ("spinbutton", "inp"),
    ("checkbox", "chk"),
    ("switch", "chk"),
    ("menuitemcheckbox", "chk"),
    ("radio", "rad"),
    ("menuitemradio", "rad"),
    ("combobox", "sel"),
    ("listbox", "sel"),
    ("option", "opt"),
    ("slider", "sld"),
    ("menuitem", "mnu"),
    ("tab", "tab"),
    ("treeitem", "itm"),
    ("gridcell", "itm"),
];

pub const GENERIC_CODE: &str = "gen";

/// One row of the tag → role inference table
#[derive(Debug, Clone, Copy)]
pub struct TagRule {
    pub tag: &'static str,
    /// Restricts the rule to `<input>` elements of this `type`
    pub input_type: Option<&'static str>,
    pub role: &'static str,
}

const fn rule(tag: &'static str, input_type: Option<&'static str>, role: &'static str) -> TagRule {
    TagRule {
        tag,
        input_type,
        role,
    }
}

/// Ordered; the first matching row wins
pub const TAG_ROLES: &[TagRule] = &[
    rule("a", None, "link"),
    rule("button", None, "button"),
    rule("input", Some("checkbox"), "checkbox"),
    rule("input", Some("radio"), "radio"),
    rule("input", Some("submit"), "button"),
    rule("input", Some("button"), "button"),
    rule("input", Some("reset"), "button"),
    rule("input", Some("image"), "button"),
    rule("input", Some("range"), "slider"),
    rule("input", Some("number"), "spinbutton"),
    rule("input", Some("search"), "searchbox"),
    rule("input", None, "textbox"),
    rule("textarea", None, "textbox"),
    rule("select", None, "combobox"),
    rule("option", None, "option"),
    rule("summary", None, "button"),
];

pub fn is_interactive_role(role: &str) -> bool {
    INTERACTIVE_ROLES.contains(&role)
}

pub fn role_code(role: &str) -> &'static str {
    ROLE_CODES
        .iter()
        .find(|(r, _)| r.eq_ignore_ascii_case(role))
        .map(|(_, code)| *code)
        .unwrap_or(GENERIC_CODE)
}

/// Canonical role for a DOM element: an explicit ARIA role wins, then the tag table.
pub fn infer_role(tag: &str, aria_role: Option<&str>, input_type: Option<&str>) -> String {
    if let Some(role) = aria_role
        .and_then(|r| r.split_whitespace().next())
        .filter(|r| !r.is_empty())
    {
        return role.to_ascii_lowercase();
    }

    let input_type = input_type.map(|t| t.to_ascii_lowercase());
    TAG_ROLES
        .iter()
        .find(|rule| {
            rule.tag.eq_ignore_ascii_case(tag)
                && rule
                    .input_type
                    .is_none_or(|want| input_type.as_deref() == Some(want))
        })
        .map(|rule| rule.role.to_string())
        .unwrap_or_else(|| "generic".to_string())
}
