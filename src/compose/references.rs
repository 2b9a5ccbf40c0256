//! Raw reference scanning.
//!
//! Finds every file a source names without composing it: `data-unify` on the
//! root `<html>`/`<body>` (layout), `data-unify` on any other element
//! (component), and legacy SSI include directives. Shared by the composition
//! engine and the dependency tracker so both agree on what a reference is.
//!
//! Also extracts the local URLs of static assets from HTML attributes and
//! CSS, which decide what a build copies.

use crate::dom::Document;
use crate::security::{is_within, normalize, percent_decode};
use crate::types::DependencyKind;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// `<!--#include file="…" -->` and `<!--#include virtual="…" -->`.
pub static INCLUDE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!--#include\s+(file|virtual)\s*=\s*"([^"]*)"\s*-->"#)
        .expect("include directive pattern is valid")
});

/// CSS `url(…)` with optional quotes.
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).expect("css url pattern is valid")
});

/// CSS `@import "…"` without `url()`.
static CSS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+['"]([^'"]+)['"]"#).expect("css import pattern is valid")
});

/// HTML attributes that may point at a static asset.
pub const ASSET_ATTRIBUTES: &[&str] = &["src", "href", "poster", "srcset"];

/// Where a reference is resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    /// Relative to the directory of the referencing file, unless the target
    /// starts with `/`.
    Referrer,
    /// Always from the source root (`virtual` includes).
    Root,
}

/// A reference exactly as written in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    pub target: String,
    pub kind: DependencyKind,
    pub base: Base,
}

/// One parsed include directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub target: String,
    pub base: Base,
}

impl IncludeDirective {
    pub fn from_captures(caps: &Captures<'_>) -> Self {
        let base = if &caps[1] == "virtual" {
            Base::Root
        } else {
            Base::Referrer
        };
        Self {
            target: caps[2].to_string(),
            base,
        }
    }
}

/// All include directives in `content`, in document order.
pub fn include_directives(content: &str) -> Vec<IncludeDirective> {
    INCLUDE_DIRECTIVE
        .captures_iter(content)
        .map(|caps| IncludeDirective::from_captures(&caps))
        .collect()
}

/// Every layout, component and include reference in `content`.
pub fn scan_references(content: &str) -> Vec<RawReference> {
    let mut refs: Vec<RawReference> = include_directives(content)
        .into_iter()
        .map(|inc| RawReference {
            target: inc.target,
            kind: DependencyKind::Include,
            base: inc.base,
        })
        .collect();

    let doc = Document::parse(content);
    for id in doc.elements(doc.root()) {
        let Some(el) = doc.element(id) else { continue };
        let Some(target) = el.attr("data-unify").map(str::trim) else {
            continue;
        };
        if target.is_empty() {
            continue;
        }
        let kind = if el.name == "html" || el.name == "body" {
            DependencyKind::Layout
        } else {
            DependencyKind::Component
        };
        refs.push(RawReference {
            target: target.to_string(),
            kind,
            base: Base::Referrer,
        });
    }
    refs
}

/// URLs in one attribute value. `srcset` lists candidates separated by
/// commas, each a URL followed by an optional descriptor.
pub fn attribute_urls<'v>(attr: &str, value: &'v str) -> Vec<&'v str> {
    if attr == "srcset" {
        value
            .split(',')
            .filter_map(|candidate| candidate.split_whitespace().next())
            .collect()
    } else {
        vec![value.trim()]
    }
}

/// URLs referenced from a stylesheet through `url()` and `@import`.
pub fn css_urls(css: &str) -> Vec<&str> {
    let mut urls: Vec<&str> = CSS_URL
        .captures_iter(css)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .collect();
    urls.extend(
        CSS_IMPORT
            .captures_iter(css)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim())),
    );
    urls
}

/// The file under `source_root` a local URL in `referrer` points at.
///
/// External URLs (with a scheme, protocol-relative, `data:`, fragments) and
/// URLs escaping the source root yield `None`. Query strings and fragments
/// are dropped. The file is not required to exist.
pub fn local_url_target(url: &str, referrer: &Path, source_root: &Path) -> Option<PathBuf> {
    let url = url.split(['?', '#']).next().unwrap_or("").trim();
    if url.is_empty() || url.starts_with("//") || has_scheme(url) {
        return None;
    }
    let decoded = percent_decode(url).unwrap_or_else(|| url.to_string());
    let target = match decoded.strip_prefix('/') {
        Some(rooted) => source_root.join(rooted),
        None => referrer.parent().unwrap_or(source_root).join(&decoded),
    };
    let target = normalize(&target);
    is_within(&target, source_root).then_some(target)
}

fn has_scheme(url: &str) -> bool {
    match url.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && !scheme.contains('/')
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_layout_on_html_and_body() {
        let refs = scan_references(r#"<html data-unify="base.html"><body></body></html>"#);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, DependencyKind::Layout);
        assert_eq!(refs[0].target, "base.html");

        let refs = scan_references(r#"<body data-unify="/_layouts/b.html"><p>x</p></body>"#);
        assert_eq!(refs[0].kind, DependencyKind::Layout);
    }

    #[test]
    fn other_elements_are_components() {
        let refs = scan_references(
            r#"<div data-unify="_card.html"></div><section data-unify="nav.html">x</section>"#,
        );
        let kinds: Vec<_> = refs.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![DependencyKind::Component, DependencyKind::Component]
        );
    }

    #[test]
    fn include_directives_both_forms() {
        let content = r#"<!--#include file="_header.html" --><p/><!--#include virtual="/_includes/f.html"-->"#;
        let incs = include_directives(content);
        assert_eq!(incs.len(), 2);
        assert_eq!(incs[0].base, Base::Referrer);
        assert_eq!(incs[0].target, "_header.html");
        assert_eq!(incs[1].base, Base::Root);
        assert_eq!(incs[1].target, "/_includes/f.html");
    }

    #[test]
    fn includes_are_scanned_as_references() {
        let refs = scan_references(r#"<!--#include file="a.html" -->"#);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, DependencyKind::Include);
    }

    #[test]
    fn empty_data_unify_is_ignored() {
        assert!(scan_references(r#"<div data-unify=""></div>"#).is_empty());
    }

    // =========================================================================
    // Asset URLs
    // =========================================================================

    #[test]
    fn srcset_candidates() {
        assert_eq!(
            attribute_urls("srcset", "a.png 1x, /b.png 2x,c.png"),
            vec!["a.png", "/b.png", "c.png"]
        );
        assert_eq!(attribute_urls("src", " x.png "), vec!["x.png"]);
    }

    #[test]
    fn css_url_and_import() {
        let css = r#"@import "base.css"; body { background: url('img/bg.png'); } .x { src: url(font.woff2) }"#;
        let urls = css_urls(css);
        assert!(urls.contains(&"img/bg.png"));
        assert!(urls.contains(&"font.woff2"));
        assert!(urls.contains(&"base.css"));
    }

    #[test]
    fn local_targets() {
        let root = Path::new("/site/src");
        let page = root.join("blog/post.html");
        assert_eq!(
            local_url_target("../css/site.css?v=2", &page, root),
            Some(root.join("css/site.css"))
        );
        assert_eq!(
            local_url_target("/img/a%20b.png#frag", &page, root),
            Some(root.join("img/a b.png"))
        );
        assert_eq!(local_url_target("https://cdn.example/x.js", &page, root), None);
        assert_eq!(local_url_target("//cdn.example/x.js", &page, root), None);
        assert_eq!(local_url_target("data:image/png;base64,xx", &page, root), None);
        assert_eq!(local_url_target("#top", &page, root), None);
        assert_eq!(local_url_target("../../../etc/passwd", &page, root), None);
    }
}
