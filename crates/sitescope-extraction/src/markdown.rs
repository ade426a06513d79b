//! Deterministic markdown projection of cleaned HTML.
//!
//! A pure function of its input: the same cleaned HTML always yields the
//! same markdown. Block structure (headings, paragraphs, lists, quotes,
//! fenced code) is preserved because downstream analyzers report 1-based
//! line numbers against this projection.

use scraper::{Html, Node, Selector};

/// Render cleaned HTML to markdown.
pub fn markdown_from_cleaned(cleaned_html: &str) -> String {
    let document = Html::parse_document(cleaned_html);
    let mut writer = Writer::default();

    let body = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next());
    match body {
        Some(body) => {
            for child in body.children() {
                writer.render_node(child);
            }
        }
        None => {
            for child in document.tree.root().children() {
                writer.render_node(child);
            }
        }
    }

    writer.finish()
}

#[derive(Default)]
struct Writer {
    out: String,
    /// Nesting stack for lists: `true` for ordered, with the next index.
    list_stack: Vec<(bool, usize)>,
}

impl Writer {
    fn finish(mut self) -> String {
        // Collapse runs of blank lines to a single separator.
        let mut lines: Vec<&str> = Vec::new();
        let mut blank_pending = false;
        for line in self.out.lines() {
            if line.trim().is_empty() {
                blank_pending = !lines.is_empty();
            } else {
                if blank_pending {
                    lines.push("");
                    blank_pending = false;
                }
                lines.push(line);
            }
        }
        self.out = lines.join("\n");
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out
    }

    fn render_node(&mut self, node: ego_tree::NodeRef<'_, Node>) {
        match node.value() {
            Node::Element(element) => self.render_element(node, element.name()),
            Node::Text(text) => {
                let trimmed = text.text.trim();
                if !trimmed.is_empty() {
                    self.push_inline(&normalise_ws(&text.text));
                }
            }
            _ => {}
        }
    }

    fn render_element(&mut self, node: ego_tree::NodeRef<'_, Node>, name: &str) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name.as_bytes()[1] - b'0';
                self.blank_line();
                self.out.push_str(&"#".repeat(level as usize));
                self.out.push(' ');
                self.out.push_str(&inline_text(node));
                self.blank_line();
            }
            "p" => {
                self.blank_line();
                self.render_children(node);
                self.blank_line();
            }
            "ul" => {
                self.blank_line();
                self.list_stack.push((false, 1));
                self.render_children(node);
                self.list_stack.pop();
                self.blank_line();
            }
            "ol" => {
                self.blank_line();
                self.list_stack.push((true, 1));
                self.render_children(node);
                self.list_stack.pop();
                self.blank_line();
            }
            "li" => {
                self.newline();
                let depth = self.list_stack.len().saturating_sub(1);
                self.out.push_str(&"  ".repeat(depth));
                let marker = match self.list_stack.last_mut() {
                    Some((true, index)) => {
                        let m = format!("{index}. ");
                        *index += 1;
                        m
                    }
                    _ => "- ".to_string(),
                };
                self.out.push_str(&marker);
                self.render_children(node);
            }
            "pre" => {
                self.blank_line();
                self.out.push_str("```\n");
                self.out.push_str(raw_text(node).trim_end());
                self.out.push_str("\n```");
                self.blank_line();
            }
            "code" => {
                self.push_inline(&format!("`{}`", raw_text(node)));
            }
            "blockquote" => {
                self.blank_line();
                let inner = inline_text(node);
                for line in inner.lines() {
                    self.out.push_str("> ");
                    self.out.push_str(line);
                    self.out.push('\n');
                }
                self.blank_line();
            }
            "a" => {
                let href = node
                    .value()
                    .as_element()
                    .and_then(|e| e.attr("href"))
                    .unwrap_or("");
                let text = inline_text(node);
                if text.is_empty() {
                    return;
                }
                if href.is_empty() {
                    self.push_inline(&text);
                } else {
                    self.push_inline(&format!("[{text}]({href})"));
                }
            }
            "img" => {
                if let Some(element) = node.value().as_element() {
                    let src = element.attr("src").unwrap_or("");
                    let alt = element.attr("alt").unwrap_or("");
                    self.push_inline(&format!("![{alt}]({src})"));
                }
            }
            "strong" | "b" => {
                let text = inline_text(node);
                if !text.is_empty() {
                    self.push_inline(&format!("**{text}**"));
                }
            }
            "em" | "i" => {
                let text = inline_text(node);
                if !text.is_empty() {
                    self.push_inline(&format!("*{text}*"));
                }
            }
            "br" => self.newline(),
            "hr" => {
                self.blank_line();
                self.out.push_str("---");
                self.blank_line();
            }
            "tr" => {
                self.newline();
                let cells: Vec<String> = node
                    .children()
                    .filter(|c| {
                        c.value()
                            .as_element()
                            .map(|e| e.name() == "td" || e.name() == "th")
                            .unwrap_or(false)
                    })
                    .map(inline_text)
                    .collect();
                if !cells.is_empty() {
                    self.out.push_str(&format!("| {} |", cells.join(" | ")));
                }
            }
            "head" | "script" | "style" => {}
            // Generic containers: recurse.
            _ => self.render_children(node),
        }
    }

    fn render_children(&mut self, node: ego_tree::NodeRef<'_, Node>) {
        for child in node.children() {
            self.render_node(child);
        }
    }

    fn push_inline(&mut self, text: &str) {
        if !self.out.is_empty() && !self.out.ends_with('\n') && !self.out.ends_with(' ') {
            self.out.push(' ');
        }
        self.out.push_str(text);
    }

    fn newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn blank_line(&mut self) {
        self.newline();
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }
}

/// Whitespace-normalised text of a subtree, scripts skipped.
fn inline_text(node: ego_tree::NodeRef<'_, Node>) -> String {
    let mut parts = Vec::new();
    collect_inline(node, &mut parts);
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_inline(node: ego_tree::NodeRef<'_, Node>, parts: &mut Vec<String>) {
    match node.value() {
        Node::Text(text) => {
            let trimmed = text.text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        Node::Element(element) if matches!(element.name(), "script" | "style") => {}
        _ => {
            for child in node.children() {
                collect_inline(child, parts);
            }
        }
    }
}

/// Verbatim text of a subtree, whitespace preserved (for `pre`/`code`).
fn raw_text(node: ego_tree::NodeRef<'_, Node>) -> String {
    let mut out = String::new();
    collect_raw(node, &mut out);
    out
}

fn collect_raw(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    if let Node::Text(text) = node.value() {
        out.push_str(&text.text);
    }
    for child in node.children() {
        collect_raw(child, out);
    }
}

fn normalise_ws(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headings_and_paragraphs() {
        let md = markdown_from_cleaned(
            "<body><h1>Title</h1><p>First para.</p><h2>Sub</h2><p>Second.</p></body>",
        );
        assert!(md.contains("# Title"));
        assert!(md.contains("## Sub"));
        assert!(md.contains("First para."));
    }

    #[test]
    fn renders_lists_with_markers() {
        let md = markdown_from_cleaned(
            "<body><ul><li>alpha</li><li>beta</li></ul><ol><li>one</li><li>two</li></ol></body>",
        );
        assert!(md.contains("- alpha"));
        assert!(md.contains("- beta"));
        assert!(md.contains("1. one"));
        assert!(md.contains("2. two"));
    }

    #[test]
    fn renders_links_and_images() {
        let md = markdown_from_cleaned(
            r#"<body><p><a href="/docs">Docs</a></p><img src="/i.png" alt="pic"></body>"#,
        );
        assert!(md.contains("[Docs](/docs)"));
        assert!(md.contains("![pic](/i.png)"));
    }

    #[test]
    fn preserves_pre_blocks_fenced() {
        let md = markdown_from_cleaned("<body><pre>let x = 1;\nlet y = 2;</pre></body>");
        assert!(md.contains("```\nlet x = 1;\nlet y = 2;\n```"));
    }

    #[test]
    fn projection_is_deterministic() {
        let html = "<body><h1>A</h1><p>b <b>c</b> d</p><ul><li>e</li></ul></body>";
        assert_eq!(markdown_from_cleaned(html), markdown_from_cleaned(html));
    }

    #[test]
    fn blank_lines_are_collapsed() {
        let md = markdown_from_cleaned("<body><p>a</p><p>b</p></body>");
        assert!(!md.contains("\n\n\n"));
        assert!(md.ends_with('\n'));
    }
}
