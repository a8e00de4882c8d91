//! The element whitelist: which tags survive purification, what they may be
//! renamed to, and which attributes they keep.
use phf::phf_map;

/// Per-element whitelist entry.
#[derive(Debug)]
pub struct ElementPolicy {
    /// Canonical tag this element is rewritten to (`b` -> `strong`)
    pub rename_to: Option<&'static str>,
    /// Attributes kept on output, in declaration order
    pub attributes: &'static [&'static str],
    /// Void elements have no content and serialize self-closed
    pub void: bool,
    /// Inline elements join text runs instead of opening a block
    pub inline: bool,
}

impl ElementPolicy {
    const fn block(attributes: &'static [&'static str]) -> Self {
        Self {
            rename_to: None,
            attributes,
            void: false,
            inline: false,
        }
    }

    const fn inline(attributes: &'static [&'static str]) -> Self {
        Self {
            rename_to: None,
            attributes,
            void: false,
            inline: true,
        }
    }

    const fn void(inline: bool, attributes: &'static [&'static str]) -> Self {
        Self {
            rename_to: None,
            attributes,
            void: true,
            inline,
        }
    }

    const fn rename(target: &'static str) -> Self {
        Self {
            rename_to: Some(target),
            attributes: &[],
            void: false,
            inline: true,
        }
    }
}

/// Attributes allowed on every whitelisted element, appended after the
/// per-element attributes.
pub const GLOBAL_ATTRIBUTES: &[&str] = &["class"];

/// Elements that participate in the active formatting list.
pub const FORMATTING_ELEMENTS: &[&str] = &["a", "strong", "em", "code"];

/// Heading tags, including the historically tolerated `h7`. Headings are
/// degraded to `p` + `strong` unless heading preservation is enabled.
pub const HEADING_ELEMENTS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "h7"];

/// Table-structure tags. Their start tags are ignored outside a table and
/// their stray end tags never close anything in body content.
pub const TABLE_STRUCTURE_ELEMENTS: &[&str] = &[
    "table", "caption", "colgroup", "col", "tbody", "thead", "tfoot", "tr", "td", "th",
];

static ELEMENTS: phf::Map<&'static str, ElementPolicy> = phf_map! {
    "p" => ElementPolicy::block(&[]),
    "a" => ElementPolicy::inline(&["href", "name", "title", "rel", "rev"]),
    "strong" => ElementPolicy::inline(&[]),
    "b" => ElementPolicy::rename("strong"),
    "em" => ElementPolicy::inline(&[]),
    "i" => ElementPolicy::rename("em"),
    "code" => ElementPolicy::inline(&[]),
    "pre" => ElementPolicy::block(&[]),
    "blockquote" => ElementPolicy::block(&["cite"]),
    "ul" => ElementPolicy::block(&[]),
    "ol" => ElementPolicy::block(&[]),
    "li" => ElementPolicy::block(&[]),
    "br" => ElementPolicy::void(true, &[]),
    "img" => ElementPolicy::void(true, &["src", "alt"]),
    "hr" => ElementPolicy::void(false, &[]),
    "h1" => ElementPolicy::block(&[]),
    "h2" => ElementPolicy::block(&[]),
    "h3" => ElementPolicy::block(&[]),
    "h4" => ElementPolicy::block(&[]),
    "h5" => ElementPolicy::block(&[]),
    "h6" => ElementPolicy::block(&[]),
    "table" => ElementPolicy::block(&[]),
    "caption" => ElementPolicy::block(&[]),
    "colgroup" => ElementPolicy::block(&[]),
    "col" => ElementPolicy::void(false, &[]),
    "tbody" => ElementPolicy::block(&[]),
    "thead" => ElementPolicy::block(&[]),
    "tfoot" => ElementPolicy::block(&[]),
    "tr" => ElementPolicy::block(&[]),
    "td" => ElementPolicy::block(&[]),
    "th" => ElementPolicy::block(&[]),
};

/// Policy for a canonical tag name.
pub fn policy(name: &str) -> Option<&'static ElementPolicy> {
    ELEMENTS.get(name)
}

/// Resolves a raw (lowercase) tag name against the whitelist, following any
/// rename. Returns the canonical name and its policy, or `None` when the
/// element is not allowed.
pub fn resolve(name: &str) -> Option<(&'static str, &'static ElementPolicy)> {
    let (key, entry) = ELEMENTS.get_entry(name)?;
    match entry.rename_to {
        Some(target) => ELEMENTS.get_entry(target).map(|(k, p)| (*k, p)),
        None => Some((*key, entry)),
    }
}

pub fn is_void(name: &str) -> bool {
    ELEMENTS.get(name).is_some_and(|p| p.void)
}

pub fn is_inline(name: &str) -> bool {
    ELEMENTS.get(name).is_some_and(|p| p.inline)
}

pub fn is_formatting(name: &str) -> bool {
    FORMATTING_ELEMENTS.contains(&name)
}

pub fn is_heading(name: &str) -> bool {
    HEADING_ELEMENTS.contains(&name)
}

pub fn is_table_structure(name: &str) -> bool {
    TABLE_STRUCTURE_ELEMENTS.contains(&name)
}

/// Whether the given attribute survives on the given element.
pub fn allows_attribute(policy: &ElementPolicy, attribute: &str) -> bool {
    policy.attributes.contains(&attribute) || GLOBAL_ATTRIBUTES.contains(&attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("b", "strong"; "b becomes strong")]
    #[test_case("i", "em"; "i becomes em")]
    #[test_case("p", "p"; "p stays p")]
    #[test_case("a", "a"; "a stays a")]
    fn resolve_renames(raw: &str, canonical: &str) {
        let (name, _) = resolve(raw).unwrap();
        assert_eq!(name, canonical);
    }

    #[test_case("span")]
    #[test_case("div")]
    #[test_case("script")]
    #[test_case("h7")]
    #[test_case("font")]
    fn disallowed_elements(raw: &str) {
        assert!(resolve(raw).is_none());
    }

    #[test]
    fn attribute_filtering() {
        let (_, a) = resolve("a").unwrap();
        assert!(allows_attribute(a, "href"));
        assert!(allows_attribute(a, "class"));
        assert!(!allows_attribute(a, "onclick"));
        assert!(!allows_attribute(a, "style"));

        let (_, p) = resolve("p").unwrap();
        assert!(allows_attribute(p, "class"));
        assert!(!allows_attribute(p, "align"));
    }

    #[test]
    fn kinds() {
        assert!(is_void("br"));
        assert!(is_void("img"));
        assert!(is_void("hr"));
        assert!(!is_void("p"));
        assert!(is_inline("a"));
        assert!(!is_inline("hr"));
        assert!(!is_inline("blockquote"));
        assert!(is_formatting("code"));
        assert!(!is_formatting("br"));
        assert!(is_table_structure("td"));
        assert!(is_heading("h7"));
    }
}
