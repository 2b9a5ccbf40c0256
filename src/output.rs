//! CLI output formatting for builds, rebuilds and checks.
//!
//! Each command has a `format_*` function returning lines (pure, tested) and
//! a `print_*` wrapper writing them to stdout. Paths are shown relative to
//! the source root.
//!
//! ## Build
//!
//! ```text
//! Built 12 pages, copied 4 assets in 38 ms
//! Cache: 3 cached, 14 changed (17 total)
//! Warnings
//!     layout not found: _layouts/old.html
//!         referenced from blog/post.html
//! Failed
//!     about.html
//!         Circular import: _layouts/a.html → _layouts/b.html → _layouts/a.html
//! ```
//!
//! ## Rebuild
//!
//! ```text
//! _layouts/base.html → rebuilt 2 of 2 pages
//!     index.html
//!     about.html
//! ```

use crate::build::{BuildError, CheckReport, IncrementalBuildResult, InitialBuildResult};
use crate::cache::CacheStats;
use crate::compose::RecoverableError;
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// The underlying reason, without the file context the caller already shows.
fn reason(err: &BuildError) -> String {
    match err {
        BuildError::Composition { source, .. } => source.to_string(),
        BuildError::Filesystem { source, .. } => source.to_string(),
        BuildError::Unknown(message) => message.clone(),
    }
}

fn warning_lines(warnings: &[RecoverableError], root: &Path) -> Vec<String> {
    if warnings.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["Warnings".to_string()];
    for warning in warnings {
        lines.push(format!(
            "{}{}: {}",
            indent(1),
            warning.kind,
            relative(&warning.path, root)
        ));
        lines.push(format!(
            "{}referenced from {}",
            indent(2),
            relative(&warning.referenced_from, root)
        ));
    }
    lines
}

fn failure_lines(failures: &[BuildError], root: &Path) -> Vec<String> {
    if failures.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["Failed".to_string()];
    for err in failures {
        lines.push(format!("{}{}", indent(1), relative(Path::new(&err.file()), root)));
        lines.push(format!("{}{}", indent(2), reason(err)));
    }
    lines
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_output(result: &InitialBuildResult, source_root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let idle = result.processed_files == 0
        && result.cache_invalidations == 0
        && result.copied_assets == 0;
    if idle && result.failed.is_empty() && result.error.is_none() {
        lines.push(format!(
            "Up to date ({} unchanged) in {} ms",
            plural(result.cache_hits, "file"),
            result.build_time_ms
        ));
        return lines;
    }

    lines.push(format!(
        "Built {}, copied {} in {} ms",
        plural(result.processed_files, "page"),
        plural(result.copied_assets, "asset"),
        result.build_time_ms
    ));
    let stats = CacheStats {
        hits: result.cache_hits,
        invalidations: result.cache_invalidations,
    };
    lines.push(format!("Cache: {}", stats));
    lines.extend(warning_lines(&result.warnings, source_root));
    lines.extend(failure_lines(&result.failed, source_root));
    if result.failed.is_empty()
        && let Some(error) = &result.error
    {
        lines.push(format!("Error: {}", error));
    }
    lines
}

pub fn print_build_output(result: &InitialBuildResult, source_root: &Path) {
    for line in format_build_output(result, source_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Rebuild
// ============================================================================

pub fn format_rebuild_output(
    changed: &Path,
    result: &IncrementalBuildResult,
    source_root: &Path,
) -> Vec<String> {
    let mut summary = Vec::new();
    if !result.affected_pages.is_empty() {
        summary.push(format!(
            "rebuilt {} of {}",
            result.rebuilt_files,
            plural(result.affected_pages.len(), "page")
        ));
    }
    if result.copied_assets > 0 {
        summary.push(format!("copied {}", plural(result.copied_assets, "asset")));
    }
    if result.removed_files > 0 {
        summary.push(format!("removed {}", plural(result.removed_files, "file")));
    }
    if summary.is_empty() {
        summary.push("nothing to do".to_string());
    }

    let mut lines = vec![format!(
        "{} → {}",
        relative(changed, source_root),
        summary.join(", ")
    )];
    for page in &result.affected_pages {
        lines.push(format!("{}{}", indent(1), relative(page, source_root)));
    }
    lines.extend(warning_lines(&result.warnings, source_root));
    lines.extend(failure_lines(&result.errors, source_root));
    lines
}

pub fn print_rebuild_output(changed: &Path, result: &IncrementalBuildResult, source_root: &Path) {
    for line in format_rebuild_output(changed, result, source_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check_output(report: &CheckReport, source_root: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "{}, {}, {}, {} ignored",
        plural(report.pages, "page"),
        plural(report.fragments, "fragment"),
        plural(report.assets, "asset"),
        report.ignored
    )];
    lines.extend(warning_lines(&report.warnings, source_root));
    lines.extend(failure_lines(&report.failed, source_root));
    lines
}

pub fn print_check_output(report: &CheckReport, source_root: &Path) {
    for line in format_check_output(report, source_root) {
        println!("{}", line);
    }
}
