//! End-to-end builds through the public API.
//!
//! Each test lays out a site under a temp dir (`src/` → `dist/`), runs the
//! builder and inspects the output tree.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use unify::build::{BuildOptions, IncrementalBuilder};
use unify::compose::CompositionError;
use unify::security::{TraversalPolicy, validate_path};
use unify::types::{ChangeEvent, ChangeKind};

// ===========================================================================
// Fixtures
// ===========================================================================

struct Site {
    tmp: TempDir,
}

impl Site {
    fn new(files: &[(&str, &str)]) -> Self {
        let site = Site {
            tmp: TempDir::new().unwrap(),
        };
        fs::create_dir_all(site.tmp.path().join("src")).unwrap();
        for (path, content) in files {
            site.write(path, content);
        }
        site
    }

    fn src(&self) -> PathBuf {
        fs::canonicalize(self.tmp.path().join("src")).unwrap()
    }

    fn dist(&self) -> PathBuf {
        self.tmp.path().join("dist")
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.tmp.path().join("src").join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn output(&self, relative: &str) -> String {
        let path = self.dist().join(relative);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("{} not written: {e}", path.display()))
    }

    fn builder(&self, options: BuildOptions) -> IncrementalBuilder {
        IncrementalBuilder::new(self.tmp.path().join("src"), self.dist(), options).unwrap()
    }
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// A layout that pulls in a nav component, two pages on the layout, one page
/// using the nav directly and one standalone page.
fn component_site() -> Site {
    Site::new(&[
        (
            "_components/nav.html",
            r#"<nav class="site-nav">nav v1</nav>"#,
        ),
        (
            "_layouts/base.html",
            r#"<html><head><title>Site</title></head><body><div data-unify="/_components/nav.html"></div><main class="unify-content">default</main></body></html>"#,
        ),
        (
            "index.html",
            r#"<html data-unify="/_layouts/base.html"><body><main class="unify-content">home</main></body></html>"#,
        ),
        (
            "about.html",
            r#"<html data-unify="/_layouts/base.html"><body><main class="unify-content">about</main></body></html>"#,
        ),
        (
            "sidebar.html",
            r#"<aside><div data-unify="/_components/nav.html"></div></aside>"#,
        ),
        ("plain.html", "<p>plain</p>"),
    ])
}

// ===========================================================================
// Full builds
// ===========================================================================

#[test]
fn second_full_build_is_all_cache_hits() {
    let site = component_site();
    let mut builder = site.builder(BuildOptions::default());
    let first = builder.perform_initial_build();
    assert!(first.success);
    assert_eq!(first.processed_files, 4);

    let second = site.builder(BuildOptions::default()).perform_initial_build();
    assert!(second.success);
    assert_eq!(second.processed_files, 0);
    assert_eq!(second.cache_hits, 6);
    assert_eq!(second.cache_invalidations, 0);
}

#[test]
fn components_inside_layouts_are_composed() {
    let site = component_site();
    site.builder(BuildOptions::default()).perform_initial_build();

    let index = site.output("index.html");
    assert!(index.contains("nav v1"));
    assert!(index.contains("home"));
    assert!(!index.contains("default"));
    assert!(!index.contains("data-unify"));
    assert!(!site.dist().join("_components").exists());
    assert!(!site.dist().join("_layouts").exists());
}

#[test]
fn only_referenced_assets_reach_the_output() {
    let site = Site::new(&[
        (
            "index.html",
            r#"<html><head><link rel="stylesheet" href="css/site.css"></head><body><img src="/img/logo.png"></body></html>"#,
        ),
        ("css/site.css", "@import \"fonts.css\";"),
        ("css/fonts.css", "@font-face { src: url(/fonts/a.woff2) }"),
        ("fonts/a.woff2", "font"),
        ("img/logo.png", "png"),
        ("img/draft.png", "png"),
        ("downloads/old.zip", "zip"),
    ]);
    let result = site.builder(BuildOptions::default()).perform_initial_build();

    assert!(result.success);
    assert_eq!(result.copied_assets, 4);
    for copied in ["css/site.css", "css/fonts.css", "fonts/a.woff2", "img/logo.png"] {
        assert!(site.dist().join(copied).exists(), "{copied} missing");
    }
    assert!(!site.dist().join("img/draft.png").exists());
    assert!(!site.dist().join("downloads/old.zip").exists());
}

#[test]
fn pretty_urls_move_pages_and_rewrite_links() {
    let site = Site::new(&[
        ("index.html", r#"<a href="about.html">About</a>"#),
        ("about.html", r#"<a href="index.html">Home</a>"#),
    ]);
    let options = BuildOptions {
        pretty_urls: true,
        ..BuildOptions::default()
    };
    assert!(site.builder(options).perform_initial_build().success);

    assert!(site.output("index.html").contains(r#"href="about/""#));
    assert!(site.dist().join("about/index.html").exists());
    assert!(!site.dist().join("about.html").exists());
}

#[test]
fn layout_cycle_fails_only_its_page() {
    let site = Site::new(&[
        (
            "_a.html",
            r#"<html data-unify="/_b.html"><body><main class="unify-content">a</main></body></html>"#,
        ),
        (
            "_b.html",
            r#"<html data-unify="/_a.html"><body><main class="unify-content">b</main></body></html>"#,
        ),
        (
            "loop.html",
            r#"<html data-unify="/_a.html"><body><main class="unify-content">x</main></body></html>"#,
        ),
        ("fine.html", "<p>fine</p>"),
    ]);
    let result = site.builder(BuildOptions::default()).perform_initial_build();

    assert!(!result.success);
    assert_eq!(result.processed_files, 1);
    assert_eq!(result.failed.len(), 1);
    assert!(result.failed[0].to_string().contains("Circular import"));
    assert_eq!(site.output("fine.html"), "<p>fine</p>");
    assert!(!site.dist().join("loop.html").exists());
}

#[test]
fn layout_cycle_error_names_the_chain() {
    let site = Site::new(&[
        (
            "_a.html",
            r#"<html data-unify="/_b.html"><body><main class="unify-content">a</main></body></html>"#,
        ),
        (
            "_b.html",
            r#"<html data-unify="/_a.html"><body><main class="unify-content">b</main></body></html>"#,
        ),
        (
            "loop.html",
            r#"<html data-unify="/_a.html"><body><main class="unify-content">x</main></body></html>"#,
        ),
    ]);
    let result = site.builder(BuildOptions::default()).perform_initial_build();
    let message = result.failed[0].to_string();
    assert!(message.contains("_a.html → _b.html → _a.html"), "{message}");
}

// ===========================================================================
// Incremental rebuilds
// ===========================================================================

#[test]
fn component_change_rebuilds_exactly_the_pages_reaching_it() {
    let site = component_site();
    let mut builder = site.builder(BuildOptions::default());
    builder.perform_initial_build();
    let plain_before = fs::metadata(site.dist().join("plain.html"))
        .unwrap()
        .modified()
        .unwrap();

    site.write("_components/nav.html", r#"<nav class="site-nav">nav v2</nav>"#);
    let result = builder.perform_incremental_build(&site.src().join("_components/nav.html"));

    assert!(result.success);
    assert_eq!(result.rebuilt_files, 3);
    assert_eq!(
        names(&result.affected_pages),
        vec!["about.html", "index.html", "sidebar.html"]
    );
    assert!(site.output("index.html").contains("nav v2"));
    assert!(site.output("sidebar.html").contains("nav v2"));
    let plain_after = fs::metadata(site.dist().join("plain.html"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(plain_before, plain_after);
}

#[test]
fn rebuild_state_survives_a_new_process() {
    let site = component_site();
    site.builder(BuildOptions::default()).perform_initial_build();

    site.write("_components/nav.html", r#"<nav class="site-nav">nav v3</nav>"#);
    let mut restarted = site.builder(BuildOptions::default());
    let result = restarted.perform_incremental_build(&site.src().join("_components/nav.html"));

    assert_eq!(result.rebuilt_files, 3);
    assert!(site.output("about.html").contains("nav v3"));
}

#[test]
fn change_events_cover_create_and_delete() {
    let site = component_site();
    let mut builder = site.builder(BuildOptions::default());
    builder.perform_initial_build();

    site.write("contact.html", "<p>contact</p>");
    let created = builder.handle_change(&ChangeEvent::new(
        site.src().join("contact.html"),
        ChangeKind::Created,
    ));
    assert!(created.success);
    assert_eq!(site.output("contact.html"), "<p>contact</p>");

    fs::remove_file(site.src().join("contact.html")).unwrap();
    let deleted = builder.handle_change(&ChangeEvent::new(
        site.src().join("contact.html"),
        ChangeKind::Deleted,
    ));
    assert!(deleted.success);
    assert_eq!(deleted.removed_files, 1);
    assert!(!site.dist().join("contact.html").exists());
}

#[test]
fn check_reports_without_writing() {
    let site = component_site();
    let report = site.builder(BuildOptions::default()).check().unwrap();
    assert_eq!(report.pages, 4);
    assert_eq!(report.fragments, 2);
    assert!(report.is_clean());
    assert!(!site.dist().exists());
}

// ===========================================================================
// Path validation
// ===========================================================================

#[test]
fn traversal_out_of_the_tree_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    let policy = TraversalPolicy::default();

    assert!(validate_path("../../etc/passwd", &src, &policy).is_err());
    assert_eq!(
        validate_path("../_includes/header.html", &src, &policy).unwrap(),
        tmp.path().join("_includes/header.html")
    );
}

#[test]
fn traversal_in_a_page_is_a_security_failure() {
    let site = Site::new(&[("bad.html", r#"<div data-unify="../../../../etc/passwd"></div>"#)]);
    let result = site.builder(BuildOptions::default()).perform_initial_build();
    assert_eq!(result.failed.len(), 1);
    assert!(matches!(
        &result.failed[0],
        unify::build::BuildError::Composition {
            source: CompositionError::Security(_),
            ..
        }
    ));
    assert!(!Path::new(&site.dist().join("bad.html")).exists());
}
