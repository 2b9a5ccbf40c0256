//! Shared test utilities for builder tests.
//!
//! A site lives in a temp directory as `src/` (sources) and `dist/`
//! (output). Helpers take the `TempDir` so tests never juggle the two roots.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = write_site(&[
//!     ("_layouts/base.html", "<main class=\"unify-content\"></main>"),
//!     ("index.html", "<main class=\"unify-content\">home</main>"),
//! ]);
//! let mut builder = builder_for(&site, BuildOptions::default());
//! assert!(builder.perform_initial_build().success);
//! assert!(read_output(&site, "index.html").contains("home"));
//! ```

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::build::{BuildOptions, IncrementalBuilder};

// =========================================================================
// Site setup
// =========================================================================

/// Write `files` (relative path, content) under `src/` of a fresh temp dir.
pub fn write_site(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("src")).unwrap();
    for (path, content) in files {
        write_file(&tmp.path().join("src").join(path), content);
    }
    tmp
}

/// Create or overwrite one source file.
pub fn write_source(site: &TempDir, relative: &str, content: &str) {
    write_file(&site.path().join("src").join(relative), content);
}

fn write_file(path: &std::path::Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

// =========================================================================
// Roots and output
// =========================================================================

/// Canonical source root, as the builder sees it.
pub fn source_dir(site: &TempDir) -> PathBuf {
    fs::canonicalize(site.path().join("src")).unwrap()
}

pub fn output_dir(site: &TempDir) -> PathBuf {
    site.path().join("dist")
}

/// Read an output file. Panics with the path when it was not written.
pub fn read_output(site: &TempDir, relative: &str) -> String {
    let path = output_dir(site).join(relative);
    fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("output {} not readable: {e}", path.display()))
}

pub fn builder_for(site: &TempDir, options: BuildOptions) -> IncrementalBuilder {
    IncrementalBuilder::new(site.path().join("src"), output_dir(site), options).unwrap()
}
