//! # Unify
//!
//! An incremental static site builder. Pages are plain HTML (or markdown)
//! that name a layout or component with a `data-unify` attribute; the builder
//! composes them into complete documents and writes only what changed.
//!
//! # Architecture: Classify, Compose, Track
//!
//! ```text
//! 1. Classify  src/**      →  page | fragment | asset | ignored
//! 2. Compose   page        →  HTML + dependency list   (parallel, read-only)
//! 3. Record    deps, hash  →  tracker + cache           (sequential)
//! ```
//!
//! Composition is a pure function of the page and an in-memory
//! [`FileSystemMap`](build::FileSystemMap) snapshot, so pages compose in
//! parallel with rayon. Everything with shared mutable state (the hash
//! cache, the dependency graph, the output directory) is touched only in the
//! sequential phase that follows.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`build`] | `IncrementalBuilder`: full builds, incremental rebuilds, deletions, checks |
//! | [`compose`] | Layout, component and include composition of one page |
//! | [`classify`] | Page / fragment / asset / ignored decision per path, with glob overrides |
//! | [`deps`] | Bidirectional page ↔ fragment graph, transitive dependents |
//! | [`cache`] | SHA-256 content hashes and persisted dependency edges |
//! | [`security`] | Path traversal checks against the source root |
//! | [`dom`] | Small forgiving HTML tree used by composition |
//! | [`markdown`] | Frontmatter splitting and markdown rendering |
//! | [`postprocess`] | Pretty-URL link rewriting and minification of emitted pages |
//! | [`config`] | `unify.toml` loading, validation and stock defaults |
//! | [`types`] | Dependency edges and change events shared between modules |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Hashes, Not Timestamps
//!
//! Change detection compares SHA-256 hashes of file contents. A `git
//! checkout` that touches every mtime rebuilds nothing it does not need to.
//!
//! ## Fragments Drive Rebuilds
//!
//! Every composed page reports the layouts, components and includes it
//! used. Editing a fragment rebuilds exactly the pages that reach it,
//! directly or through other fragments, and nothing else. A page that names
//! a fragment which does not exist yet is still tracked, so creating that
//! fragment later rebuilds it.
//!
//! ## Degrade, Don't Abort
//!
//! A missing layout or include produces a warning and a page that is still
//! written. A circular import, a traversal outside the source root or an
//! unreadable file fails that one page; the rest of the site builds.

pub mod build;
pub mod cache;
pub mod classify;
pub mod compose;
pub mod config;
pub mod deps;
pub mod dom;
pub mod markdown;
pub mod output;
pub mod postprocess;
pub mod security;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
