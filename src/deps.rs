//! Dependency graph between source files.
//!
//! Edges point from a referencing file (a page, or a fragment that itself
//! references layouts, components or includes) to the file it references.
//! The builder asks the reverse question: which pages must be rebuilt when
//! fragment `F` changes? [`DependencyTracker::get_all_transitive_dependents`]
//! answers it with a breadth-first walk over reversed edges.
//!
//! Edges are recorded two ways:
//!
//! - from a composition result, which already lists every file the page
//!   touched at any depth ([`DependencyTracker::record_dependencies`])
//! - by scanning raw source for `data-unify` and include references
//!   ([`DependencyTracker::track_page_dependencies`]), used when composition
//!   failed and for fragments
//!
//! A referenced file is recorded even when it does not exist yet, so that
//! creating it rebuilds the pages waiting for it.

use crate::compose::references::{Base, RawReference, scan_references};
use crate::compose::resolve::resolve_on_disk;
use crate::markdown;
use crate::security::TraversalPolicy;
use crate::types::{Dependency, DependencyKind};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct DependencyTracker {
    /// source → what it references
    edges: BTreeMap<PathBuf, BTreeSet<Dependency>>,
    /// referenced path → sources referencing it
    reverse: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    /// Sources that are pages (emitted), as opposed to fragments.
    pages: BTreeSet<PathBuf>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sources with recorded edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn is_page(&self, path: &Path) -> bool {
        self.pages.contains(path)
    }

    /// Replace every edge of `page` with `deps`.
    pub fn record_dependencies(&mut self, page: &Path, deps: &[Dependency]) {
        self.pages.insert(page.to_path_buf());
        self.set_edges(page, deps);
    }

    /// Replace every edge of a fragment with `deps`.
    pub fn record_fragment_dependencies(&mut self, fragment: &Path, deps: &[Dependency]) {
        self.pages.remove(fragment);
        self.set_edges(fragment, deps);
    }

    /// Scan the raw source of `page` and record one edge per reference.
    pub fn track_page_dependencies(
        &mut self,
        page: &Path,
        content: &str,
        source_root: &Path,
        policy: &TraversalPolicy,
    ) -> Vec<Dependency> {
        let deps = scan_dependencies(page, content, source_root, policy);
        self.record_dependencies(page, &deps);
        deps
    }

    /// Scan the raw source of a fragment (a layout using another layout, a
    /// component including a file) and record its edges.
    pub fn track_fragment_dependencies(
        &mut self,
        fragment: &Path,
        content: &str,
        source_root: &Path,
        policy: &TraversalPolicy,
    ) -> Vec<Dependency> {
        let deps = scan_dependencies(fragment, content, source_root, policy);
        self.record_fragment_dependencies(fragment, &deps);
        deps
    }

    /// What `source` references, in stable order.
    pub fn dependencies_of(&self, source: &Path) -> Vec<Dependency> {
        self.edges
            .get(source)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every page that reaches `target` through one or more edges.
    ///
    /// Each page appears once, however many paths lead to it, and cycles in
    /// the graph terminate. `target` itself is never returned.
    pub fn get_all_transitive_dependents(&self, target: &Path) -> Vec<PathBuf> {
        let mut visited: BTreeSet<&Path> = BTreeSet::new();
        let mut queue: VecDeque<&Path> = VecDeque::from([target]);
        let mut pages = Vec::new();
        visited.insert(target);

        while let Some(current) = queue.pop_front() {
            let Some(sources) = self.reverse.get(current) else {
                continue;
            };
            for source in sources {
                if !visited.insert(source.as_path()) {
                    continue;
                }
                if self.pages.contains(source) {
                    pages.push(source.clone());
                }
                queue.push_back(source.as_path());
            }
        }
        pages
    }

    /// Drop every edge originating from `path` (deleted page or fragment).
    pub fn remove_page(&mut self, path: &Path) {
        self.set_edges(path, &[]);
        self.pages.remove(path);
    }

    /// Rebuild the graph from persisted dependency lists.
    pub fn restore<'d>(
        &mut self,
        entries: impl IntoIterator<Item = (PathBuf, &'d [Dependency])>,
        is_page: impl Fn(&Path) -> bool,
    ) {
        self.edges.clear();
        self.reverse.clear();
        self.pages.clear();
        for (source, deps) in entries {
            if is_page(&source) {
                self.record_dependencies(&source, deps);
            } else {
                self.record_fragment_dependencies(&source, deps);
            }
        }
        debug!(sources = self.edges.len(), "restored dependency graph");
    }

    fn set_edges(&mut self, source: &Path, deps: &[Dependency]) {
        if let Some(old) = self.edges.remove(source) {
            for dep in old {
                if let Some(sources) = self.reverse.get_mut(&dep.path) {
                    sources.remove(source);
                    if sources.is_empty() {
                        self.reverse.remove(&dep.path);
                    }
                }
            }
        }

        let deps: BTreeSet<Dependency> = deps
            .iter()
            .filter(|dep| dep.path != source)
            .cloned()
            .collect();
        if deps.is_empty() {
            return;
        }
        for dep in &deps {
            self.reverse
                .entry(dep.path.clone())
                .or_default()
                .insert(source.to_path_buf());
        }
        self.edges.insert(source.to_path_buf(), deps);
    }
}

/// Resolve every reference in `content` to a dependency of `source`.
///
/// References that fail path validation are skipped: composing the page
/// reports them as errors.
fn scan_dependencies(
    source: &Path,
    content: &str,
    source_root: &Path,
    policy: &TraversalPolicy,
) -> Vec<Dependency> {
    let mut refs = scan_references(content);
    if markdown::is_markdown(source)
        && let Some(layout) = markdown::frontmatter_layout(content)
    {
        refs.push(RawReference {
            target: layout,
            kind: DependencyKind::Layout,
            base: Base::Referrer,
        });
    }

    refs.into_iter()
        .filter_map(
            |r| match resolve_on_disk(&r.target, r.base, source, source_root, policy) {
                Ok(path) => Some(Dependency::new(path, r.kind)),
                Err(err) => {
                    debug!(source = %source.display(), error = %err, "skipping invalid reference");
                    None
                }
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn p(s: &str) -> PathBuf {
        PathBuf::from("/site").join(s)
    }

    fn layout(path: &str) -> Dependency {
        Dependency::new(p(path), DependencyKind::Layout)
    }

    // =========================================================================
    // Transitive dependents
    // =========================================================================

    #[test]
    fn direct_dependents_of_layout() {
        let mut t = DependencyTracker::new();
        t.record_dependencies(&p("a.html"), &[layout("_layouts/base.html")]);
        t.record_dependencies(&p("b.html"), &[layout("_layouts/base.html")]);
        t.record_dependencies(&p("c.html"), &[layout("_layouts/other.html")]);

        let pages = t.get_all_transitive_dependents(&p("_layouts/base.html"));
        assert_eq!(pages, vec![p("a.html"), p("b.html")]);
    }

    #[test]
    fn transitive_through_fragments() {
        let mut t = DependencyTracker::new();
        t.record_fragment_dependencies(&p("_layouts/base.html"), &[layout("_layouts/root.html")]);
        t.record_fragment_dependencies(
            &p("_layouts/root.html"),
            &[Dependency::new(p("_includes/nav.html"), DependencyKind::Include)],
        );
        t.record_dependencies(&p("index.html"), &[layout("_layouts/base.html")]);

        assert_eq!(
            t.get_all_transitive_dependents(&p("_includes/nav.html")),
            vec![p("index.html")]
        );
    }

    #[test]
    fn each_page_returned_once() {
        let mut t = DependencyTracker::new();
        t.record_fragment_dependencies(&p("_a.html"), &[layout("_shared.html")]);
        t.record_fragment_dependencies(&p("_b.html"), &[layout("_shared.html")]);
        t.record_dependencies(
            &p("page.html"),
            &[
                Dependency::new(p("_a.html"), DependencyKind::Component),
                Dependency::new(p("_b.html"), DependencyKind::Component),
                layout("_shared.html"),
            ],
        );
        assert_eq!(
            t.get_all_transitive_dependents(&p("_shared.html")),
            vec![p("page.html")]
        );
    }

    #[test]
    fn cycles_terminate() {
        let mut t = DependencyTracker::new();
        t.record_fragment_dependencies(&p("_a.html"), &[layout("_b.html")]);
        t.record_fragment_dependencies(&p("_b.html"), &[layout("_a.html")]);
        t.record_dependencies(&p("page.html"), &[layout("_a.html")]);

        assert_eq!(t.get_all_transitive_dependents(&p("_b.html")), vec![p("page.html")]);
        // Repeated queries give the same answer
        assert_eq!(t.get_all_transitive_dependents(&p("_b.html")), vec![p("page.html")]);
    }

    #[test]
    fn self_edges_are_dropped() {
        let mut t = DependencyTracker::new();
        t.record_dependencies(&p("a.html"), &[layout("a.html")]);
        assert!(t.dependencies_of(&p("a.html")).is_empty());
        assert!(t.get_all_transitive_dependents(&p("a.html")).is_empty());
    }

    #[test]
    fn rerecording_replaces_edges() {
        let mut t = DependencyTracker::new();
        t.record_dependencies(&p("a.html"), &[layout("_old.html")]);
        t.record_dependencies(&p("a.html"), &[layout("_new.html")]);
        assert!(t.get_all_transitive_dependents(&p("_old.html")).is_empty());
        assert_eq!(t.get_all_transitive_dependents(&p("_new.html")), vec![p("a.html")]);
    }

    #[test]
    fn remove_page_drops_edges() {
        let mut t = DependencyTracker::new();
        t.record_dependencies(&p("a.html"), &[layout("_l.html")]);
        t.remove_page(&p("a.html"));
        assert!(t.is_empty());
        assert!(t.get_all_transitive_dependents(&p("_l.html")).is_empty());
        assert!(!t.is_page(&p("a.html")));
    }

    #[test]
    fn restore_from_persisted_lists() {
        let deps_a = vec![layout("_l.html")];
        let deps_l = vec![layout("_root.html")];
        let mut t = DependencyTracker::new();
        t.restore(
            vec![
                (p("a.html"), deps_a.as_slice()),
                (p("_l.html"), deps_l.as_slice()),
            ],
            |path| !path.to_string_lossy().contains("/_"),
        );
        assert!(t.is_page(&p("a.html")));
        assert!(!t.is_page(&p("_l.html")));
        assert_eq!(
            t.get_all_transitive_dependents(&p("_root.html")),
            vec![p("a.html")]
        );
    }

    // =========================================================================
    // Raw scanning
    // =========================================================================

    #[test]
    fn track_page_dependencies_scans_all_reference_kinds() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("_layouts")).unwrap();
        fs::write(root.join("_layouts/base.html"), "<html></html>").unwrap();

        let page = root.join("index.html");
        let content = r#"<html data-unify="base.html"><body>
            <div data-unify="/_components/card.html"></div>
            <!--#include virtual="/_includes/footer.html" -->
        </body></html>"#;

        let mut t = DependencyTracker::new();
        let deps = t.track_page_dependencies(&page, content, root, &TraversalPolicy::default());

        // Existing fallback candidate wins for the layout
        assert!(deps.contains(&Dependency::new(
            root.join("_layouts/base.html"),
            DependencyKind::Layout
        )));
        // Missing files are still recorded at their primary location
        assert!(deps.contains(&Dependency::new(
            root.join("_components/card.html"),
            DependencyKind::Component
        )));
        assert!(deps.contains(&Dependency::new(
            root.join("_includes/footer.html"),
            DependencyKind::Include
        )));
        assert_eq!(
            t.get_all_transitive_dependents(&root.join("_includes/footer.html")),
            vec![page]
        );
    }

    #[test]
    fn markdown_layout_from_frontmatter() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let page = root.join("post.md");
        let mut t = DependencyTracker::new();
        let deps = t.track_page_dependencies(
            &page,
            "---\nlayout: /_layouts/post.html\n---\n# Hi\n",
            root,
            &TraversalPolicy::default(),
        );
        assert_eq!(
            deps,
            vec![Dependency::new(
                root.join("_layouts/post.html"),
                DependencyKind::Layout
            )]
        );
    }

    #[test]
    fn invalid_references_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut t = DependencyTracker::new();
        let deps = t.track_page_dependencies(
            &tmp.path().join("index.html"),
            r#"<div data-unify="../../../../etc/passwd"></div>"#,
            tmp.path(),
            &TraversalPolicy::default(),
        );
        assert!(deps.is_empty());
    }
}
