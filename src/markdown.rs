//! Markdown page rendering.
//!
//! Markdown conversion itself is a collaborator of the build core: the
//! composition engine only needs `content → (html, frontmatter)`. That seam
//! is the [`MarkdownRenderer`] trait; [`PulldownRenderer`] is the production
//! implementation on top of `pulldown-cmark`.
//!
//! ## Frontmatter
//!
//! A leading block delimited by `---` lines holds `key: value` pairs:
//!
//! ```text
//! ---
//! title: About us
//! layout: /_layouts/base.html
//! ---
//! # About
//! ```
//!
//! `title` falls back to the first `# heading` in the body. `layout` becomes
//! the page's `data-unify` reference (see [`page_document`]).

use pulldown_cmark::{Options, Parser, html as md_html};
use std::collections::BTreeMap;
use std::path::Path;

/// Output of rendering one markdown source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMarkdown {
    pub html: String,
    pub frontmatter: BTreeMap<String, String>,
}

impl RenderedMarkdown {
    pub fn title(&self) -> Option<&str> {
        self.frontmatter.get("title").map(String::as_str)
    }

    pub fn layout(&self) -> Option<&str> {
        self.frontmatter
            .get("layout")
            .map(String::as_str)
            .filter(|l| !l.is_empty())
    }
}

/// Converts markdown to HTML. Implementations must be shareable across the
/// page-composition worker threads.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, content: &str) -> RenderedMarkdown;
}

/// `pulldown-cmark` renderer with tables, footnotes and strikethrough.
#[derive(Debug, Default, Clone, Copy)]
pub struct PulldownRenderer;

impl MarkdownRenderer for PulldownRenderer {
    fn render(&self, content: &str) -> RenderedMarkdown {
        let (mut frontmatter, body) = split_frontmatter(content);

        if !frontmatter.contains_key("title")
            && let Some(heading) = first_heading(body)
        {
            frontmatter.insert("title".to_string(), heading);
        }

        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        let parser = Parser::new_ext(body, options);
        let mut html = String::new();
        md_html::push_html(&mut html, parser);

        RenderedMarkdown { html, frontmatter }
    }
}

/// Wrap rendered markdown into an HTML page the composition engine can
/// treat like any authored `.html` page.
///
/// With a `layout`, the result declares it on `<html data-unify>` and puts
/// the body in `<main class="unify-content">`, which fills either a
/// `unify-content` area or, through landmark matching, the layout's `<main>`.
/// Without one, a standalone document is produced.
pub fn page_document(rendered: &RenderedMarkdown) -> String {
    let title = rendered
        .title()
        .map(|t| format!("<title>{}</title>", escape_text(t)))
        .unwrap_or_default();
    match rendered.layout() {
        Some(layout) => format!(
            "<html data-unify=\"{}\"><head>{}</head><body><main class=\"unify-content\">{}</main></body></html>",
            layout.replace('"', "&quot;"),
            title,
            rendered.html
        ),
        None => format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">{}</head><body><main>{}</main></body></html>\n",
            title, rendered.html
        ),
    }
}

/// `.md` and `.markdown` sources.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

/// The `layout` frontmatter value of a markdown source, without rendering it.
pub fn frontmatter_layout(content: &str) -> Option<String> {
    let (frontmatter, _) = split_frontmatter(content);
    frontmatter.get("layout").filter(|l| !l.is_empty()).cloned()
}

fn split_frontmatter(content: &str) -> (BTreeMap<String, String>, &str) {
    let mut map = BTreeMap::new();
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (map, content);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if trimmed == "---" {
            return (map, &rest[offset..]);
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            map.insert(key.trim().to_string(), value.to_string());
        }
    }
    // No closing delimiter: not frontmatter after all.
    (BTreeMap::new(), content)
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches("# ").trim().to_string())
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
