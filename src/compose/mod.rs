//! Page composition.
//!
//! Turns one page source into final HTML by resolving everything it
//! references. For each file (the page, then recursively its components and
//! layouts) the engine runs these steps:
//!
//! 1. **Cycle guard**: a file already on the [`ProcessingStack`] is a
//!    circular import and fails with the full chain.
//! 2. **Includes**: legacy `<!--#include file|virtual="…"-->` directives are
//!    expanded textually (see [`include`]).
//! 3. **Components**: any element other than `<html>`/`<body>` carrying
//!    `data-unify` is replaced by the composed component. The host's children
//!    fill the component's areas.
//! 4. **Layout**: `data-unify` on `<html>` (or `<body>`) names a layout. The
//!    layout is composed first, then the page's areas, root attributes and
//!    `<head>` are merged into it (see [`merge`]).
//!
//! Finally `data-unify`/`data-layer` markers are stripped and the static
//! assets referenced by the output are collected as dependencies.
//!
//! ## Failure semantics
//!
//! Security violations, cycles and nesting beyond [`MAX_DEPTH`] are
//! [`CompositionError`]s and fail the page. A missing layout, component or
//! include is not: composition continues with the best available output and
//! the condition is returned as a [`RecoverableError`] in the result.
//!
//! ## Concurrency
//!
//! A [`Composer`] only reads the [`FileSystemMap`], so pages can be composed
//! in parallel. Per-build mutable state (the expanded-fragment memo and the
//! set of already-reported missing files) lives in [`CompositionContext`].

mod include;
pub mod merge;
pub mod references;
pub mod resolve;

use crate::build::FileSystemMap;
use crate::dom::{Document, NodeId};
use crate::markdown::{self, MarkdownRenderer};
use crate::security::{SecurityError, TraversalPolicy};
use crate::types::{Dependency, DependencyKind};
use references::Base;
use resolve::Resolver;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum nesting of layouts, components and includes.
pub const MAX_DEPTH: usize = 10;

#[derive(Error, Debug)]
pub enum CompositionError {
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error("Circular import: {chain}")]
    CircularImport { chain: String },
    #[error("Nesting deeper than {limit} levels at {}", .path.display())]
    DepthExceeded { path: PathBuf, limit: usize },
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoverableKind {
    MissingLayout,
    MissingComponent,
    MissingInclude,
    /// Include nesting beyond [`MAX_DEPTH`]; the directive is left in place.
    IncludeDepth,
}

impl fmt::Display for RecoverableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecoverableKind::MissingLayout => "layout not found",
            RecoverableKind::MissingComponent => "component not found",
            RecoverableKind::MissingInclude => "include not found",
            RecoverableKind::IncludeDepth => "include nesting too deep",
        };
        f.write_str(label)
    }
}

/// A fault that degraded the output of one page without failing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverableError {
    pub kind: RecoverableKind,
    /// The file that could not be used.
    pub path: PathBuf,
    /// The file whose reference pointed at it.
    pub referenced_from: PathBuf,
}

impl fmt::Display for RecoverableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (referenced from {})",
            self.kind,
            self.path.display(),
            self.referenced_from.display()
        )
    }
}

impl std::error::Error for RecoverableError {}

/// Output of composing one page.
#[derive(Debug, Clone, Default)]
pub struct CompositionResult {
    pub html: String,
    /// Every file the page depends on, sorted and without duplicates.
    pub dependencies: Vec<Dependency>,
    pub errors: Vec<RecoverableError>,
}

impl CompositionResult {
    /// True when nothing had to be degraded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A fragment source after markdown rendering and include expansion.
#[derive(Debug, Default)]
struct Expanded {
    content: String,
    dependencies: Vec<Dependency>,
    errors: Vec<RecoverableError>,
}

/// Mutable state shared by all pages of one build.
///
/// The memo is filled check-then-set: two threads may expand the same
/// fragment concurrently, which wastes work but yields identical entries.
#[derive(Debug, Default)]
pub struct CompositionContext {
    expanded: RwLock<HashMap<PathBuf, Arc<Expanded>>>,
    warned: Mutex<HashSet<PathBuf>>,
}

impl CompositionContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, path: &Path) -> Option<Arc<Expanded>> {
        self.expanded.read().ok()?.get(path).cloned()
    }

    fn remember(&self, path: &Path, expanded: Arc<Expanded>) {
        if let Ok(mut memo) = self.expanded.write() {
            memo.insert(path.to_path_buf(), expanded);
        }
    }

    /// True the first time `path` is reported in this build.
    fn first_report(&self, path: &Path) -> bool {
        self.warned
            .lock()
            .map(|mut seen| seen.insert(path.to_path_buf()))
            .unwrap_or(true)
    }
}

/// Files currently being composed, innermost last.
///
/// Each recursion level pushes a new frame that borrows its parent, so the
/// stack is never shared mutably between pages or threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingStack<'a> {
    top: Option<(&'a Path, &'a ProcessingStack<'a>)>,
    depth: usize,
}

impl<'a> ProcessingStack<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&'a self, path: &'a Path) -> ProcessingStack<'a> {
        ProcessingStack {
            top: Some((path, self)),
            depth: self.depth + 1,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths().iter().any(|p| *p == path)
    }

    /// Paths on the stack, outermost first.
    pub fn paths(&self) -> Vec<&'a Path> {
        let mut out = Vec::with_capacity(self.depth);
        let mut frame = self;
        while let Some((path, parent)) = frame.top {
            out.push(path);
            frame = parent;
        }
        out.reverse();
        out
    }

    /// `A → B → A` for a cycle re-entering `repeated`, names relative to `root`.
    pub fn cycle_chain(&self, repeated: &Path, root: &Path) -> String {
        let paths = self.paths();
        let start = paths.iter().position(|p| *p == repeated).unwrap_or(0);
        let mut names: Vec<String> = paths[start..]
            .iter()
            .map(|p| display_name(p, root))
            .collect();
        names.push(display_name(repeated, root));
        names.join(" → ")
    }
}

fn display_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Page,
    Layout,
    Component,
}

/// What one page composition accumulates across all recursion levels.
#[derive(Debug, Default)]
struct Collected {
    dependencies: Vec<Dependency>,
    errors: Vec<RecoverableError>,
    /// Component `<head>` elements waiting to be moved into the page head.
    hoisted: Vec<String>,
}

/// Composes pages against one source root and file map.
pub struct Composer<'a> {
    resolver: Resolver<'a>,
    renderer: &'a dyn MarkdownRenderer,
    context: &'a CompositionContext,
}

impl<'a> Composer<'a> {
    pub fn new(
        source_root: &'a Path,
        files: &'a FileSystemMap,
        policy: &'a TraversalPolicy,
        renderer: &'a dyn MarkdownRenderer,
        context: &'a CompositionContext,
    ) -> Self {
        Self {
            resolver: Resolver {
                source_root,
                policy,
                files,
            },
            renderer,
            context,
        }
    }

    pub fn source_root(&self) -> &Path {
        self.resolver.source_root
    }

    /// Compose the page at `path` (absolute) whose source is `content`.
    pub fn process_file(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<CompositionResult, CompositionError> {
        let mut collected = Collected::default();
        let stack = ProcessingStack::new();
        let mut doc = self.compose(path, content, &stack, Role::Page, &mut collected)?;

        merge::hoist_into_head(&mut doc, &collected.hoisted);
        merge::strip_markers(&mut doc);
        collected
            .dependencies
            .extend(self.asset_dependencies(path, &doc));

        let dependencies: BTreeSet<Dependency> = collected
            .dependencies
            .into_iter()
            .filter(|dep| dep.path != path)
            .collect();
        debug!(
            page = %path.display(),
            dependencies = dependencies.len(),
            recoverable = collected.errors.len(),
            "composed page"
        );
        Ok(CompositionResult {
            html: doc.to_html(),
            dependencies: dependencies.into_iter().collect(),
            errors: collected.errors,
        })
    }

    fn compose(
        &self,
        path: &Path,
        raw: &str,
        stack: &ProcessingStack<'_>,
        role: Role,
        out: &mut Collected,
    ) -> Result<Document, CompositionError> {
        if stack.contains(path) {
            return Err(CompositionError::CircularImport {
                chain: stack.cycle_chain(path, self.source_root()),
            });
        }
        if stack.depth() > MAX_DEPTH {
            return Err(CompositionError::DepthExceeded {
                path: path.to_path_buf(),
                limit: MAX_DEPTH,
            });
        }

        let expanded = self.expand(path, raw, role)?;
        out.dependencies
            .extend(expanded.dependencies.iter().cloned());
        out.errors.extend(expanded.errors.iter().cloned());

        let mut doc = Document::parse(&expanded.content);
        let here = stack.push(path);
        self.expand_components(path, &mut doc, &here, out)?;
        self.apply_layout(path, doc, &here, out)
    }

    /// Markdown sources become HTML: pages as a full document, fragments as
    /// their rendered body.
    fn prepare(&self, path: &Path, raw: &str, role: Role) -> String {
        if !markdown::is_markdown(path) {
            return raw.to_string();
        }
        let rendered = self.renderer.render(raw);
        match role {
            Role::Page => markdown::page_document(&rendered),
            Role::Layout | Role::Component => rendered.html,
        }
    }

    fn expand_components(
        &self,
        path: &Path,
        doc: &mut Document,
        here: &ProcessingStack<'_>,
        out: &mut Collected,
    ) -> Result<(), CompositionError> {
        let hosts: Vec<NodeId> = doc
            .elements(doc.root())
            .into_iter()
            .filter(|id| {
                doc.element(*id).is_some_and(|el| {
                    el.name != "html" && el.name != "body" && el.has_attr("data-unify")
                })
            })
            .collect();

        // Innermost first, so a host nested inside another host is already
        // expanded when its children move into the outer component.
        for host in hosts.into_iter().rev() {
            if !doc.is_attached(host) {
                continue;
            }
            let target = doc
                .element(host)
                .and_then(|el| el.attr("data-unify"))
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            if let Some(el) = doc.element_mut(host) {
                el.remove_attr("data-unify");
            }
            if target.is_empty() {
                continue;
            }

            let resolved = self.resolver.resolve(&target, Base::Referrer, path)?;
            out.dependencies
                .push(Dependency::new(&resolved.primary, DependencyKind::Component));
            let Some((component_path, source)) = resolved.found else {
                self.report_missing(
                    RecoverableKind::MissingComponent,
                    resolved.primary,
                    path,
                    out,
                );
                continue;
            };
            out.dependencies
                .push(Dependency::new(&component_path, DependencyKind::Component));

            let component = self.compose(&component_path, &source, here, Role::Component, out)?;
            splice_component(doc, host, component, out);
        }
        Ok(())
    }

    fn apply_layout(
        &self,
        path: &Path,
        mut doc: Document,
        here: &ProcessingStack<'_>,
        out: &mut Collected,
    ) -> Result<Document, CompositionError> {
        let Some((marker, target)) = layout_marker(&doc) else {
            return Ok(doc);
        };
        if let Some(el) = doc.element_mut(marker) {
            el.remove_attr("data-unify");
        }

        let resolved = self.resolver.resolve(&target, Base::Referrer, path)?;
        out.dependencies
            .push(Dependency::new(&resolved.primary, DependencyKind::Layout));
        let Some((layout_path, source)) = resolved.found else {
            self.report_missing(RecoverableKind::MissingLayout, resolved.primary, path, out);
            return Ok(doc);
        };
        out.dependencies
            .push(Dependency::new(&layout_path, DependencyKind::Layout));

        let mut layout = self.compose(&layout_path, &source, here, Role::Layout, out)?;
        compose_into_layout(&mut layout, &doc);
        Ok(layout)
    }

    fn report_missing(
        &self,
        kind: RecoverableKind,
        missing: PathBuf,
        referenced_from: &Path,
        out: &mut Collected,
    ) {
        if self.context.first_report(&missing) {
            warn!(
                path = %missing.display(),
                referenced_from = %referenced_from.display(),
                "{}", kind
            );
        }
        out.errors.push(RecoverableError {
            kind,
            path: missing,
            referenced_from: referenced_from.to_path_buf(),
        });
    }

    /// Static files under the source root referenced by `src`, `href`,
    /// `poster` or `srcset` in the composed page.
    fn asset_dependencies(&self, page: &Path, doc: &Document) -> Vec<Dependency> {
        let mut deps = Vec::new();
        for id in doc.elements(doc.root()) {
            let Some(el) = doc.element(id) else { continue };
            for attr in references::ASSET_ATTRIBUTES {
                let Some(value) = el.attr(attr) else { continue };
                for url in references::attribute_urls(attr, value) {
                    if let Some(target) =
                        references::local_url_target(url, page, self.source_root())
                        && target.is_file()
                        && !is_page_source(&target)
                    {
                        deps.push(Dependency::new(target, DependencyKind::Asset));
                    }
                }
            }
        }
        deps
    }
}

fn is_page_source(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("html" | "htm" | "md" | "markdown")
    )
}

/// The root element declaring a layout, with the trimmed reference.
fn layout_marker(doc: &Document) -> Option<(NodeId, String)> {
    ["html", "body"].into_iter().find_map(|name| {
        let id = doc.find_by_name(name)?;
        let target = doc.element(id)?.attr("data-unify")?.trim();
        (!target.is_empty()).then(|| (id, target.to_string()))
    })
}

/// Merge a composed page into its composed layout.
fn compose_into_layout(layout: &mut Document, page: &Document) {
    let page_scope = merge::content_scope(page);
    let layout_scope = merge::content_scope(layout);
    let outcome = merge::fill_areas(layout, layout_scope, page, page_scope);

    // Nothing to match against: the page body becomes the layout's main
    // content (or is appended to its body).
    if !outcome.has_areas && outcome.filled == 0 {
        let nodes = merge::content_nodes(page, page_scope);
        let has_content = nodes
            .iter()
            .any(|n| !page.outer_html(*n).trim().is_empty());
        if has_content {
            let target = layout.find_by_name("main");
            if let Some(main) = target {
                layout.clear_children(main);
            }
            let parent = target.unwrap_or(layout_scope);
            for node in nodes {
                let copy = layout.import(page, node);
                layout.append_child(parent, copy);
            }
        }
    }

    merge::merge_root_attributes(layout, page);
    merge::merge_head(layout, page);
}

/// Replace `host` in `doc` with the composed component.
fn splice_component(
    doc: &mut Document,
    host: NodeId,
    mut component: Document,
    out: &mut Collected,
) {
    if let Some(head) = component.find_by_name("head") {
        for child in component.children(head) {
            if component.element(*child).is_some() {
                out.hoisted.push(component.outer_html(*child));
            }
        }
    }

    let scope = merge::content_scope(&component);
    if !doc.children(host).is_empty() {
        merge::fill_areas(&mut component, scope, doc, host);
    }
    let nodes = merge::content_nodes(&component, scope);
    if let Some(root) = merge::single_element(&component, &nodes) {
        merge::merge_element_attributes(&mut component, root, doc, host);
    }

    let imported: Vec<NodeId> = nodes
        .iter()
        .map(|node| doc.import(&component, *node))
        .collect();
    doc.replace_with(host, &imported);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::PulldownRenderer;
    use tempfile::TempDir;

    const ROOT: &str = "/site";

    fn compose_in(
        root: &Path,
        files: &[(&str, &str)],
        page: &str,
    ) -> Result<CompositionResult, CompositionError> {
        let mut map = FileSystemMap::new(root);
        for (path, content) in files {
            map.insert(*path, *content);
        }
        let policy = TraversalPolicy::default();
        let context = CompositionContext::new();
        let composer = Composer::new(root, &map, &policy, &PulldownRenderer, &context);
        let path = root.join(page);
        let content = map.get(&path).unwrap();
        composer.process_file(&path, &content)
    }

    fn compose(files: &[(&str, &str)], page: &str) -> Result<CompositionResult, CompositionError> {
        compose_in(Path::new(ROOT), files, page)
    }

    fn kinds(result: &CompositionResult) -> Vec<RecoverableKind> {
        result.errors.iter().map(|e| e.kind).collect()
    }

    // =========================================================================
    // Layouts
    // =========================================================================

    #[test]
    fn areas_attributes_and_head_merge() {
        let layout = r#"<html><head><title>L</title><meta charset="utf-8"></head><body><div id="stable" class="layout unify-content" data-x="1">default</div><aside class="unify-side">side default</aside></body></html>"#;
        let page = r#"<html data-unify="/_layout.html"><head><title>P</title><meta name="description" content="d"><meta charset="utf-8"></head><body><div class="page unify-content" data-y="2"><p>body</p></div></body></html>"#;
        let result = compose(&[("_layout.html", layout), ("page.html", page)], "page.html").unwrap();

        assert!(result.is_clean());
        let html = &result.html;
        assert!(html.contains(
            r#"<div id="stable" class="layout unify-content page" data-x="1" data-y="2"><p>body</p></div>"#
        ));
        assert!(html.contains("side default"));
        assert!(html.contains("<title>P</title>"));
        assert!(!html.contains("<title>L</title>"));
        assert!(html.contains(r#"name="description""#));
        assert_eq!(html.matches("charset").count(), 1);
        assert!(!html.contains("data-unify"));
        assert_eq!(
            result.dependencies,
            vec![Dependency::new("/site/_layout.html", DependencyKind::Layout)]
        );
    }

    #[test]
    fn landmarks_pair_when_layout_has_no_areas() {
        let layout = "<html><body><header>LH</header><main>LM</main><footer>LF</footer></body></html>";
        let page = r#"<html data-unify="_l.html"><body><main>PM</main></body></html>"#;
        let html = compose(&[("_l.html", layout), ("page.html", page)], "page.html")
            .unwrap()
            .html;
        assert!(html.contains("<header>LH</header>"));
        assert!(html.contains("<main>PM</main>"));
        assert!(html.contains("<footer>LF</footer>"));
        assert!(!html.contains("LM"));
    }

    #[test]
    fn page_content_lands_in_body_without_areas_or_landmarks() {
        let layout = r#"<html><body><div class="wrap">W</div></body></html>"#;
        let page = r#"<html data-unify="_l.html"><body><p>P</p></body></html>"#;
        let html = compose(&[("_l.html", layout), ("page.html", page)], "page.html")
            .unwrap()
            .html;
        assert!(html.contains(r#"<div class="wrap">W</div>"#));
        assert!(html.contains("<p>P</p>"));
    }

    #[test]
    fn layouts_chain_through_fragment_directories() {
        let base = r#"<html><body><nav>site nav</nav><main class="unify-content"></main></body></html>"#;
        let blog = r#"<html data-unify="base"><body><main class="unify-content"><article class="unify-content">post</article></main></body></html>"#;
        let page = r#"<html data-unify="blog.html"><body><main class="unify-content">entry</main></body></html>"#;
        let result = compose(
            &[
                ("_layouts/base.html", base),
                ("_layouts/blog.html", blog),
                ("page.html", page),
            ],
            "page.html",
        )
        .unwrap();
        assert!(result.html.contains("site nav"));
        assert!(result.html.contains("entry"));
        let paths: Vec<&Path> = result.dependencies.iter().map(|d| d.path.as_path()).collect();
        assert!(paths.contains(&Path::new("/site/_layouts/base.html")));
        assert!(paths.contains(&Path::new("/site/_layouts/blog.html")));
    }

    #[test]
    fn missing_layout_is_recoverable() {
        let page = r#"<html data-unify="missing.html"><body><p>mine</p></body></html>"#;
        let result = compose(&[("page.html", page)], "page.html").unwrap();

        assert_eq!(kinds(&result), vec![RecoverableKind::MissingLayout]);
        assert_eq!(result.errors[0].path, PathBuf::from("/site/missing.html"));
        assert_eq!(result.errors[0].referenced_from, PathBuf::from("/site/page.html"));
        assert!(result.html.contains("<p>mine</p>"));
        assert!(!result.html.contains("data-unify"));
    }

    #[test]
    fn layout_cycle_names_the_chain() {
        let a = r#"<html data-unify="_b.html"><body><main></main></body></html>"#;
        let b = r#"<html data-unify="_a.html"><body><main></main></body></html>"#;
        let page = r#"<html data-unify="_a.html"><body><main>x</main></body></html>"#;
        let err = compose(&[("_a.html", a), ("_b.html", b), ("page.html", page)], "page.html")
            .unwrap_err();
        match err {
            CompositionError::CircularImport { chain } => {
                assert_eq!(chain, "_a.html → _b.html → _a.html")
            }
            other => panic!("expected circular import, got {other:?}"),
        }
    }

    #[test]
    fn page_using_itself_as_layout_is_a_cycle() {
        let page = r#"<html data-unify="page.html"><body></body></html>"#;
        let err = compose(&[("page.html", page)], "page.html").unwrap_err();
        assert!(
            matches!(err, CompositionError::CircularImport { ref chain } if chain == "page.html → page.html")
        );
    }

    #[test]
    fn layout_nesting_beyond_limit_fails() {
        let mut files: Vec<(String, String)> = (0..12)
            .map(|n| {
                (
                    format!("_l{n}.html"),
                    format!(r#"<html data-unify="_l{}.html"><body><main></main></body></html>"#, n + 1),
                )
            })
            .collect();
        files.push(("_l12.html".into(), "<html><body><main></main></body></html>".into()));
        files.push((
            "page.html".into(),
            r#"<html data-unify="_l0.html"><body></body></html>"#.into(),
        ));
        let borrowed: Vec<(&str, &str)> =
            files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();

        let err = compose(&borrowed, "page.html").unwrap_err();
        assert!(matches!(err, CompositionError::DepthExceeded { limit: MAX_DEPTH, .. }));
    }

    #[test]
    fn traversal_in_reference_is_fatal() {
        let page = r#"<html data-unify="../../../../../../etc/passwd"><body></body></html>"#;
        let err = compose(&[("page.html", page)], "page.html").unwrap_err();
        assert!(matches!(err, CompositionError::Security(_)));
    }

    // =========================================================================
    // Components
    // =========================================================================

    #[test]
    fn component_replaces_host_and_hoists_head() {
        let card = r#"<head><style>.card{}</style></head><article class="card"><h2 class="unify-title">Default</h2></article>"#;
        let page = r#"<html><head><title>T</title></head><body><div data-unify="_card.html" class="featured"><h2 class="unify-title">Custom</h2></div></body></html>"#;
        let result = compose(&[("_card.html", card), ("page.html", page)], "page.html").unwrap();

        let html = &result.html;
        assert!(html.contains(
            r#"<article class="card featured"><h2 class="unify-title">Custom</h2></article>"#
        ));
        assert!(!html.contains("Default"));
        let style = html.find("<style>.card{}</style>").unwrap();
        assert!(style < html.find("</head>").unwrap());
        assert_eq!(
            result.dependencies,
            vec![Dependency::new("/site/_card.html", DependencyKind::Component)]
        );
    }

    #[test]
    fn nested_components_expand_recursively() {
        let inner = r#"<span class="badge">new</span>"#;
        let outer = r#"<div class="box"><b data-unify="_inner.html"></b></div>"#;
        let page = r#"<body><section data-unify="_outer.html"></section></body>"#;
        let html = compose(
            &[("_inner.html", inner), ("_outer.html", outer), ("page.html", page)],
            "page.html",
        )
        .unwrap()
        .html;
        assert!(html.contains(r#"<div class="box"><span class="badge">new</span></div>"#));
    }

    #[test]
    fn missing_component_keeps_host_content() {
        let page = r#"<body><div data-unify="_nope.html"><p>kept</p></div></body>"#;
        let result = compose(&[("page.html", page)], "page.html").unwrap();
        assert_eq!(kinds(&result), vec![RecoverableKind::MissingComponent]);
        assert!(result.html.contains("<div><p>kept</p></div>"));
    }

    #[test]
    fn shared_missing_component_warns_once_but_reports_per_page() {
        let root = Path::new(ROOT);
        let mut map = FileSystemMap::new(root);
        map.insert("a.html", r#"<body><div data-unify="_nope.html">a</div></body>"#);
        map.insert("b.html", r#"<body><div data-unify="_nope.html">b</div></body>"#);
        let policy = TraversalPolicy::default();
        let context = CompositionContext::new();
        let composer = Composer::new(root, &map, &policy, &PulldownRenderer, &context);

        let mut reported = 0;
        for page in ["a.html", "b.html"] {
            let path = root.join(page);
            let content = map.get(&path).unwrap();
            let result = composer.process_file(&path, &content).unwrap();
            assert_eq!(kinds(&result), vec![RecoverableKind::MissingComponent]);
            reported += result.errors.len();
        }
        assert_eq!(reported, 2);
        // Already warned through the shared context
        assert!(!context.first_report(&root.join("_nope.html")));
    }

    #[test]
    fn component_cycle_is_fatal() {
        let a = r#"<div data-unify="_b.html"></div>"#;
        let b = r#"<div data-unify="_a.html"></div>"#;
        let page = r#"<body><div data-unify="_a.html"></div></body>"#;
        let err = compose(&[("_a.html", a), ("_b.html", b), ("page.html", page)], "page.html")
            .unwrap_err();
        assert!(matches!(err, CompositionError::CircularImport { .. }));
    }

    #[test]
    fn markers_never_leak() {
        let page = r#"<body data-layer="x"><p data-layer="y">a</p></body>"#;
        let html = compose(&[("page.html", page)], "page.html").unwrap().html;
        assert!(!html.contains("data-layer"));
    }

    // =========================================================================
    // Includes
    // =========================================================================

    #[test]
    fn file_and_virtual_includes_expand() {
        let page = r#"<body><!--#include file="_meta.html" --><p>x</p><!--#include virtual="/_includes/footer.html" --></body>"#;
        let result = compose(
            &[
                ("blog/_meta.html", "<header>H</header>"),
                ("_includes/footer.html", "<footer>F</footer>"),
                ("blog/post.html", page),
            ],
            "blog/post.html",
        )
        .unwrap();

        assert!(result.is_clean());
        assert!(result.html.contains("<header>H</header><p>x</p><footer>F</footer>"));
        assert!(!result.html.contains("#include"));
        assert_eq!(
            result.dependencies,
            vec![
                Dependency::new("/site/_includes/footer.html", DependencyKind::Include),
                Dependency::new("/site/blog/_meta.html", DependencyKind::Include),
            ]
        );
    }

    #[test]
    fn markdown_include_is_rendered() {
        let page = r#"<body><!--#include file="_note.md" --></body>"#;
        let html = compose(&[("_note.md", "Some *emphasis*."), ("page.html", page)], "page.html")
            .unwrap()
            .html;
        assert!(html.contains("<em>emphasis</em>"));
    }

    #[test]
    fn missing_include_is_left_in_place() {
        let page = r#"<body><!--#include file="_gone.html" --><p>x</p></body>"#;
        let result = compose(&[("page.html", page)], "page.html").unwrap();
        assert_eq!(kinds(&result), vec![RecoverableKind::MissingInclude]);
        assert!(result.html.contains(r#"<!--#include file="_gone.html" -->"#));
        assert!(result.html.contains("<p>x</p>"));
    }

    #[test]
    fn include_cycle_is_fatal() {
        let err = compose(
            &[
                ("_a.html", r#"<!--#include file="_b.html" -->"#),
                ("_b.html", r#"<!--#include file="_a.html" -->"#),
                ("page.html", r#"<!--#include file="_a.html" -->"#),
            ],
            "page.html",
        )
        .unwrap_err();
        match err {
            CompositionError::CircularImport { chain } => {
                assert_eq!(chain, "_a.html → _b.html → _a.html")
            }
            other => panic!("expected circular import, got {other:?}"),
        }
    }

    #[test]
    fn deep_include_nesting_degrades() {
        let mut files: Vec<(String, String)> = (0..15)
            .map(|n| {
                (
                    format!("_i{n}.html"),
                    format!(r#"<span>{n}</span><!--#include file="_i{}.html" -->"#, n + 1),
                )
            })
            .collect();
        files.push(("_i15.html".into(), "<span>end</span>".into()));
        files.push(("page.html".into(), r#"<!--#include file="_i0.html" -->"#.into()));
        let borrowed: Vec<(&str, &str)> =
            files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();

        let result = compose(&borrowed, "page.html").unwrap();
        assert!(kinds(&result).contains(&RecoverableKind::IncludeDepth));
        assert!(result.html.contains("<span>0</span>"));
        assert!(!result.html.contains("<span>end</span>"));
    }

    // =========================================================================
    // Markdown pages and assets
    // =========================================================================

    #[test]
    fn markdown_page_uses_frontmatter_layout() {
        let layout = r#"<html><head><title>Site</title></head><body><main class="unify-content">x</main></body></html>"#;
        let post = "---\ntitle: Hello\nlayout: /_layouts/base.html\n---\n# Heading\n\nText.";
        let html = compose(&[("_layouts/base.html", layout), ("post.md", post)], "post.md")
            .unwrap()
            .html;
        assert!(html.contains("<title>Hello</title>"));
        assert!(html.contains("<h1>Heading</h1>"));
        assert!(html.contains("Text."));
        assert!(!html.contains(">x<"));
    }

    #[test]
    fn referenced_local_files_become_asset_dependencies() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("img")).unwrap();
        std::fs::write(root.join("img/a.png"), "png").unwrap();
        std::fs::write(root.join("other.html"), "").unwrap();

        let page = r#"<img src="img/a.png" srcset="img/a.png 2x"><a href="other.html">o</a><script src="https://cdn/x.js"></script>"#;
        let result = compose_in(root, &[("index.html", page)], "index.html").unwrap();
        assert_eq!(
            result.dependencies,
            vec![Dependency::new(root.join("img/a.png"), DependencyKind::Asset)]
        );
    }

    // =========================================================================
    // Processing stack
    // =========================================================================

    #[test]
    fn processing_stack_frames() {
        let root = Path::new("/site");
        let a = root.join("a.html");
        let b = root.join("b.html");
        let empty = ProcessingStack::new();
        let one = empty.push(&a);
        let two = one.push(&b);

        assert_eq!(two.depth(), 2);
        assert!(two.contains(&a));
        assert!(!one.contains(&b));
        assert_eq!(two.paths(), vec![a.as_path(), b.as_path()]);
        assert_eq!(two.cycle_chain(&a, root), "a.html → b.html → a.html");
    }
}
