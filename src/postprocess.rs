//! Output transforms applied to composed HTML before it is written.
//!
//! Both are pure `&str -> String` functions over the composed document:
//!
//! - [`normalize_links`]: `.md` links point at the generated `.html`, and
//!   with pretty URLs `about.html` becomes `about/` and `docs/index.html`
//!   becomes `docs/`
//! - [`minify_html`]: comments dropped, whitespace runs collapsed outside
//!   `pre`, `textarea`, `script` and `style`

use crate::dom::{Document, NodeData, NodeId};

const WHITESPACE_SENSITIVE: &[&str] = &["pre", "textarea", "script", "style"];

/// Rewrite local `<a href>` links to match the output layout.
pub fn normalize_links(html: &str, pretty_urls: bool) -> String {
    let mut doc = Document::parse(html);
    let mut changed = false;
    for id in doc.elements(doc.root()) {
        let Some(el) = doc.element_mut(id) else { continue };
        if el.name != "a" {
            continue;
        }
        let Some(href) = el.attr("href") else { continue };
        if let Some(rewritten) = rewrite_href(href, pretty_urls)
            && rewritten != href
        {
            el.set_attr("href", rewritten);
            changed = true;
        }
    }
    if changed { doc.to_html() } else { html.to_string() }
}

fn rewrite_href(href: &str, pretty_urls: bool) -> Option<String> {
    if href.is_empty() || href.starts_with('#') || href.starts_with("//") || has_scheme(href) {
        return None;
    }
    let split = href.find(['?', '#']).unwrap_or(href.len());
    let (path, suffix) = href.split_at(split);

    let mut path = path.to_string();
    for ext in [".md", ".markdown"] {
        if let Some(stem) = path.strip_suffix(ext) {
            path = format!("{}.html", stem);
            break;
        }
    }

    if pretty_urls {
        if path == "index.html" {
            path = "./".to_string();
        } else if let Some(dir) = path.strip_suffix("/index.html") {
            path = format!("{}/", dir);
        } else if let Some(stem) = path.strip_suffix(".html") {
            path = format!("{}/", stem);
        }
    }
    Some(format!("{}{}", path, suffix))
}

fn has_scheme(href: &str) -> bool {
    href.split_once(':').is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Drop comments and collapse insignificant whitespace.
///
/// Conditional comments (`<!--[if …]>`) and SSI directives left in place
/// after a failed include are kept.
pub fn minify_html(html: &str) -> String {
    let mut doc = Document::parse(html);
    let root = doc.root();
    minify_node(&mut doc, root);
    doc.to_html()
}

fn minify_node(doc: &mut Document, id: NodeId) {
    let children: Vec<NodeId> = doc.children(id).to_vec();
    // Whether the last kept text sibling ended in a space.
    let mut trailing_space = false;
    for child in children {
        match doc.data_mut(child) {
            NodeData::Comment(text) => {
                if text.starts_with("[if") || text.starts_with('#') {
                    trailing_space = false;
                } else {
                    doc.detach(child);
                }
            }
            NodeData::Text(text) => {
                let mut collapsed = collapse_whitespace(text);
                if trailing_space && collapsed.starts_with(' ') {
                    collapsed.remove(0);
                }
                if collapsed.is_empty() {
                    doc.detach(child);
                } else {
                    trailing_space = collapsed.ends_with(' ');
                    *text = collapsed;
                }
            }
            NodeData::Element(el) => {
                trailing_space = false;
                if !WHITESPACE_SENSITIVE.contains(&el.name.as_str()) {
                    minify_node(doc, child);
                }
            }
            NodeData::Document | NodeData::Doctype(_) => trailing_space = false,
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
