//! Shared types passed between the composition engine, the dependency
//! tracker, the build cache and the incremental builder.
//!
//! [`Dependency`] is serialized into the persisted dependency map, so its
//! field names are part of the on-disk cache format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a page (or fragment) refers to another file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// `data-unify` on the root `<html>`/`<body>` element.
    Layout,
    /// `data-unify` on any other element.
    Component,
    /// Legacy `<!--#include file|virtual="…"-->` directive.
    Include,
    /// A static file referenced from the composed output (`src`, `href`, CSS `url()`).
    Asset,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DependencyKind::Layout => "layout",
            DependencyKind::Component => "component",
            DependencyKind::Include => "include",
            DependencyKind::Asset => "asset",
        };
        f.write_str(label)
    }
}

/// One edge of the dependency graph: the referencing file points at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    /// Absolute, lexically normalized path of the referenced file.
    pub path: PathBuf,
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn new(path: impl Into<PathBuf>, kind: DependencyKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// What happened to a file, as reported by the external file watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A debounced file-system event delivered to
/// [`IncrementalBuilder::handle_change`](crate::build::IncrementalBuilder::handle_change).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
