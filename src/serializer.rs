//! Indented writer: renders a purified document tree back to markup.
//!
//! Block elements get their own lines, indented two spaces per depth; text
//! and inline elements are grouped into runs that share a line. Attributes
//! are filtered against the whitelist here, in declaration order, so the
//! output is canonical regardless of how the input spelled them.
use crate::document::Document;
use crate::node::{Node, NodeData, NodeId};
use crate::whitelist;

const INDENT: &str = "  ";

/// Renders the document to its canonical string form. The result carries no
/// leading or trailing whitespace.
pub fn serialize(document: &Document) -> String {
    let mut writer = Writer {
        document,
        buffer: String::new(),
    };
    writer.write_children(NodeId::root(), 0);
    writer.buffer.trim().to_string()
}

struct Writer<'doc> {
    document: &'doc Document,
    buffer: String,
}

impl Writer<'_> {
    fn write_children(&mut self, id: NodeId, depth: usize) {
        let Some(node) = self.document.get_node_by_id(id) else {
            return;
        };
        let children = node.children.clone();

        let mut run = String::new();
        for child_id in children {
            if self.renders_inline(child_id) {
                self.render_inline(child_id, &mut run);
            } else {
                self.flush_run(&mut run, depth);
                self.write_block(child_id, depth);
            }
        }
        self.flush_run(&mut run, depth);
    }

    /// Whether a subtree joins the current text run. An inline element that
    /// ended up holding a block descendant (a table opened inside an open
    /// `strong`, say) is laid out as a block so the nested structure still
    /// gets its own indented lines.
    fn renders_inline(&self, id: NodeId) -> bool {
        let Some(node) = self.document.get_node_by_id(id) else {
            return false;
        };
        match &node.data {
            NodeData::Text { .. } => true,
            NodeData::Document => false,
            NodeData::Element { .. } => {
                whitelist::is_inline(&node.name)
                    && node.children.iter().all(|&child| self.renders_inline(child))
            }
        }
    }

    /// Emits a pending inline run as one indented line. Runs that trim to
    /// nothing (inter-element whitespace) are dropped.
    fn flush_run(&mut self, run: &mut String, depth: usize) {
        let text = run.trim();
        if !text.is_empty() {
            self.indent(depth);
            self.buffer.push_str(text);
            self.buffer.push('\n');
        }
        run.clear();
    }

    fn render_inline(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.document.get_node_by_id(id) else {
            return;
        };
        match &node.data {
            NodeData::Document => {}
            NodeData::Text { value } => out.push_str(&escape_text(value)),
            NodeData::Element { .. } => {
                if whitelist::is_void(&node.name) {
                    out.push('<');
                    out.push_str(&node.name);
                    out.push_str(&self.attributes_string(node));
                    out.push_str(" />");
                    return;
                }
                if self.document.is_empty_node(id) {
                    return;
                }
                out.push('<');
                out.push_str(&node.name);
                out.push_str(&self.attributes_string(node));
                out.push('>');
                for &child in &node.children {
                    self.render_inline(child, out);
                }
                out.push_str("</");
                out.push_str(&node.name);
                out.push('>');
            }
        }
    }

    fn write_block(&mut self, id: NodeId, depth: usize) {
        let Some(node) = self.document.get_node_by_id(id) else {
            return;
        };
        let name = node.name.clone();
        let attributes = self.attributes_string(node);

        if whitelist::is_void(&name) {
            self.indent(depth);
            self.buffer.push('<');
            self.buffer.push_str(&name);
            self.buffer.push_str(&attributes);
            self.buffer.push_str(" />\n");
            return;
        }

        if self.document.is_empty_node(id) {
            return;
        }

        self.indent(depth);
        self.buffer.push('<');
        self.buffer.push_str(&name);
        self.buffer.push_str(&attributes);
        self.buffer.push_str(">\n");

        self.write_children(id, depth + 1);

        self.indent(depth);
        self.buffer.push_str("</");
        self.buffer.push_str(&name);
        self.buffer.push_str(">\n");
    }

    /// Whitelisted attributes in declaration order, each escaped and quoted.
    fn attributes_string(&self, node: &Node) -> String {
        let Some(policy) = whitelist::policy(&node.name) else {
            return String::new();
        };
        let mut out = String::new();
        for &attr in policy
            .attributes
            .iter()
            .chain(whitelist::GLOBAL_ATTRIBUTES.iter())
        {
            if let Some(value) = node.get_attribute(attr) {
                if value.is_empty() {
                    continue;
                }
                out.push(' ');
                out.push_str(attr);
                out.push_str("=\"");
                out.push_str(&escape_attribute(value));
                out.push('"');
            }
        }
        out
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.buffer.push_str(INDENT);
        }
    }
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn doc() -> Document {
        Document::new()
    }

    #[test]
    fn paragraph_with_text() {
        let mut document = doc();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        document.add_node(Node::new_text("hello"), p);

        assert_eq!(serialize(&document), "<p>\n  hello\n</p>");
    }

    #[test]
    fn inline_elements_share_the_text_line() {
        let mut document = doc();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        document.add_node(Node::new_text("Testing "), p);
        let strong = document.add_node(Node::new_element("strong", vec![]), p);
        document.add_node(Node::new_text("some bold"), strong);
        document.add_node(Node::new_text(" and testing"), p);

        assert_eq!(
            serialize(&document),
            "<p>\n  Testing <strong>some bold</strong> and testing\n</p>"
        );
    }

    #[test]
    fn nested_blocks_indent_per_depth() {
        let mut document = doc();
        let table = document.add_node(Node::new_element("table", vec![]), NodeId::root());
        let tbody = document.add_node(Node::new_element("tbody", vec![]), table);
        let tr = document.add_node(Node::new_element("tr", vec![]), tbody);
        let td = document.add_node(Node::new_element("td", vec![]), tr);
        document.add_node(Node::new_text("x"), td);

        assert_eq!(
            serialize(&document),
            "<table>\n  <tbody>\n    <tr>\n      <td>\n        x\n      </td>\n    </tr>\n  </tbody>\n</table>"
        );
    }

    #[test]
    fn voids_self_close() {
        let mut document = doc();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        document.add_node(Node::new_text("a"), p);
        document.add_node(Node::new_element("br", vec![]), p);
        document.add_node(
            Node::new_element("img", vec![("src".into(), "x.png".into())]),
            p,
        );

        assert_eq!(serialize(&document), "<p>\n  a<br /><img src=\"x.png\" />\n</p>");
    }

    #[test]
    fn empty_elements_are_elided() {
        let mut document = doc();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        document.add_node(Node::new_text("a"), p);
        let strong = document.add_node(Node::new_element("strong", vec![]), p);
        document.add_node(Node::new_text("  "), strong);
        document.add_node(Node::new_element("ul", vec![]), NodeId::root());

        assert_eq!(serialize(&document), "<p>\n  a\n</p>");
    }

    #[test]
    fn inline_wrapper_with_block_child_lays_out_as_block() {
        let mut document = doc();
        let strong = document.add_node(Node::new_element("strong", vec![]), NodeId::root());
        document.add_node(Node::new_text("a"), strong);
        let table = document.add_node(Node::new_element("table", vec![]), strong);
        document.add_node(Node::new_text("t"), table);

        assert_eq!(
            serialize(&document),
            "<strong>\n  a\n  <table>\n    t\n  </table>\n</strong>"
        );
    }

    #[test]
    fn attributes_follow_declaration_order() {
        let mut document = doc();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        let a = document.add_node(
            Node::new_element(
                "a",
                vec![
                    ("class".into(), "ext".into()),
                    ("onclick".into(), "evil()".into()),
                    ("title".into(), "t".into()),
                    ("href".into(), "/x".into()),
                ],
            ),
            p,
        );
        document.add_node(Node::new_text("link"), a);

        assert_eq!(
            serialize(&document),
            "<p>\n  <a href=\"/x\" title=\"t\" class=\"ext\">link</a>\n</p>"
        );
    }

    #[test]
    fn whitespace_only_runs_are_dropped() {
        let mut document = doc();
        document.add_node(Node::new_text("  \n  "), NodeId::root());
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        document.add_node(Node::new_text("x"), p);
        document.add_node(Node::new_text("  "), NodeId::root());

        assert_eq!(serialize(&document), "<p>\n  x\n</p>");
    }

    #[test_case("a & b", "a &amp; b")]
    #[test_case("1 < 2 > 0", "1 &lt; 2 &gt; 0")]
    #[test_case("plain", "plain")]
    fn text_escaping(input: &str, expected: &str) {
        assert_eq!(escape_text(input), expected);
    }

    #[test]
    fn attribute_escaping_covers_quotes() {
        assert_eq!(escape_attribute(r#"say "hi" & go"#), "say &quot;hi&quot; &amp; go");
    }
}
