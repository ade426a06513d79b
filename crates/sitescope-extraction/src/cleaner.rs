//! Semantic-preserving HTML cleaning.
//!
//! The cleaned projection keeps headings, paragraphs, lists, images with
//! `alt` and the rest of the content tree, and discards script, style,
//! noscript and comment nodes plus presentational attributes. `<code>` and
//! `<pre>` contents are preserved verbatim. The output is canonical
//! (lowercase tags, sorted attributes, stable escaping), which makes
//! cleaning idempotent: cleaning cleaned HTML yields the same bytes.

use scraper::{Html, Node};

/// Elements removed wholesale, subtree included.
const DROPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Attributes discarded as presentation or behaviour.
fn attribute_dropped(name: &str) -> bool {
    name == "style" || name.starts_with("on")
}

/// Produce the cleaned HTML projection of a raw page.
pub fn clean_html(raw_html: &str) -> String {
    let document = Html::parse_document(raw_html);
    let mut out = String::with_capacity(raw_html.len() / 2);
    for child in document.tree.root().children() {
        serialize_node(child, &mut out);
    }
    out
}

fn serialize_node(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Element(element) => {
            let name = element.name();
            if DROPPED_ELEMENTS.contains(&name) {
                return;
            }
            out.push('<');
            out.push_str(name);
            for (attr_name, attr_value) in element.attrs() {
                if attribute_dropped(attr_name) {
                    continue;
                }
                out.push(' ');
                out.push_str(attr_name);
                out.push_str("=\"");
                escape_attr(attr_value, out);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            for child in node.children() {
                serialize_node(child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        Node::Text(text) => {
            escape_text(&text.text, out);
        }
        // Comments, doctype and processing instructions are dropped.
        _ => {}
    }
}

/// Text content of cleaned HTML with original whitespace and line breaks
/// preserved. Scanners that report line numbers run against this.
pub fn text_content(cleaned_html: &str) -> String {
    let document = Html::parse_document(cleaned_html);
    let mut out = String::new();
    collect_text_verbatim(document.tree.root(), &mut out);
    out
}

fn collect_text_verbatim(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Element(element) => {
            if DROPPED_ELEMENTS.contains(&element.name()) {
                return;
            }
        }
        Node::Text(text) => {
            out.push_str(&text.text);
            return;
        }
        _ => {}
    }
    for child in node.children() {
        collect_text_verbatim(child, out);
    }
}

fn escape_text(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
