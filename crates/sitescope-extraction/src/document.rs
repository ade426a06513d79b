//! Parsed page model consumed by analyzers.
//!
//! A page is parsed once into a [`PageDocument`]; everything an analyzer
//! needs (title, meta tags, headings, images, JSON-LD, visible text, HTML
//! comments) is extracted here so no analyzer touches raw markup again.

use scraper::{Html, Node, Selector};
use serde::{Deserialize, Serialize};

/// A heading with its level, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingRef {
    /// 1 for `<h1>` through 6 for `<h6>`.
    pub level: u8,
    pub text: String,
}

/// An image reference with its alternative text, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: Option<String>,
}

/// Everything analyzers read from one page, extracted in a single parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageDocument {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<HeadingRef>,
    pub images: Vec<ImageRef>,
    /// Raw JSON-LD payloads from `<script type="application/ld+json">`.
    pub json_ld: Vec<serde_json::Value>,
    /// Visible text with scripts/styles skipped, whitespace-normalised.
    pub visible_text: String,
    /// Whitespace-separated token count of `visible_text`.
    pub word_count: usize,
    /// HTML comment bodies, in document order.
    pub comments: Vec<String>,
}

impl PageDocument {
    /// Parse a raw HTML page into the analyzer model.
    pub fn parse(raw_html: &str) -> Self {
        let document = Html::parse_document(raw_html);

        let title = select_first_text(&document, "title");
        let meta_description = select_meta_content(&document, "description");
        let headings = extract_headings(&document);
        let images = extract_images(&document);
        let json_ld = extract_json_ld(&document);
        let comments = extract_comments(&document);
        let visible_text = extract_visible_text(&document);
        let word_count = visible_text.split_whitespace().count();

        Self {
            title,
            meta_description,
            headings,
            images,
            json_ld,
            visible_text,
            word_count,
            comments,
        }
    }

    /// Number of `<h1>` headings.
    pub fn h1_count(&self) -> usize {
        self.headings.iter().filter(|h| h.level == 1).count()
    }

    /// True when heading levels never skip downwards (h1 -> h3 is a skip).
    pub fn headings_monotonic(&self) -> bool {
        let mut previous: Option<u8> = None;
        for heading in &self.headings {
            if let Some(prev) = previous {
                if heading.level > prev + 1 {
                    return false;
                }
            }
            previous = Some(heading.level);
        }
        true
    }
}

/// Extract just the document title, for callers that do not need the full
/// model.
pub fn extract_title(raw_html: &str) -> Option<String> {
    let document = Html::parse_document(raw_html);
    select_first_text(&document, "title").filter(|t| !t.is_empty())
}

fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next().map(|el| {
        el.text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    })
}

fn select_meta_content(document: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse("meta[name]").ok()?;
    for element in document.select(&selector) {
        let meta_name = element.value().attr("name")?;
        if meta_name.eq_ignore_ascii_case(name) {
            return element
                .value()
                .attr("content")
                .map(|c| c.trim().to_string());
        }
    }
    None
}

fn extract_headings(document: &Html) -> Vec<HeadingRef> {
    let mut headings = Vec::new();
    if let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") {
        for element in document.select(&selector) {
            let level = match element.value().name() {
                "h1" => 1,
                "h2" => 2,
                "h3" => 3,
                "h4" => 4,
                "h5" => 5,
                _ => 6,
            };
            let text = element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            headings.push(HeadingRef { level, text });
        }
    }
    headings
}

fn extract_images(document: &Html) -> Vec<ImageRef> {
    let mut images = Vec::new();
    if let Ok(selector) = Selector::parse("img[src]") {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                let alt = element
                    .value()
                    .attr("alt")
                    .filter(|a| !a.trim().is_empty())
                    .map(|a| a.to_string());
                images.push(ImageRef {
                    src: src.to_string(),
                    alt,
                });
            }
        }
    }
    images
}

fn extract_json_ld(document: &Html) -> Vec<serde_json::Value> {
    let mut blocks = Vec::new();
    if let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) {
        for element in document.select(&selector) {
            let body = element.text().collect::<String>();
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
                blocks.push(value);
            }
        }
    }
    blocks
}

fn extract_comments(document: &Html) -> Vec<String> {
    let mut comments = Vec::new();
    for node in document.tree.nodes() {
        if let Node::Comment(comment) = node.value() {
            comments.push(comment.comment.to_string());
        }
    }
    comments
}

/// Walk the tree collecting text, skipping script/style subtrees.
fn extract_visible_text(document: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect_text(document.tree.root(), &mut parts);
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, parts: &mut Vec<String>) {
    match node.value() {
        Node::Element(element) => {
            if matches!(element.name(), "script" | "style" | "noscript" | "template") {
                return;
            }
        }
        Node::Text(text) => {
            let trimmed = text.text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
            return;
        }
        _ => {}
    }
    for child in node.children() {
        collect_text(child, parts);
    }
}
