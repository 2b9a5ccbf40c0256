//! Turning a reference string into a validated file.
//!
//! Candidates are tried in order and the first one with content wins:
//!
//! 1. the reference itself: from the source root when it starts with `/`
//!    (or is a `virtual` include), otherwise relative to the referencing file
//! 2. the same with `.html` appended, when the reference has no extension
//! 3. a bare file name (no directory part) under `_layouts/`,
//!    `_includes/` and `_components/`
//!
//! Every candidate passes [`validate_reference`] (or [`validate_path`] for
//! the fragment directories) before it is looked up. A
//! security failure on the reference itself is returned as an error;
//! fallback candidates that fail validation are skipped.

use super::references::Base;
use crate::build::FileSystemMap;
use crate::security::{
    SecurityError, TraversalPolicy, is_within, validate_path, validate_reference,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Conventional fragment directories searched for bare names.
pub const FRAGMENT_DIRS: &[&str] = &["_layouts", "_includes", "_components"];

/// A resolved reference.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The reference as written, resolved and validated. Recorded as the
    /// dependency even when nothing exists there yet, so creating the file
    /// later rebuilds the referrer.
    pub primary: PathBuf,
    /// The candidate that exists, with its content.
    pub found: Option<(PathBuf, Arc<str>)>,
}

/// Validated candidate paths for `target`, most specific first.
pub fn candidates(
    target: &str,
    base: Base,
    referrer: &Path,
    source_root: &Path,
    policy: &TraversalPolicy,
) -> Result<Vec<PathBuf>, SecurityError> {
    let target = target.trim();
    let from_root = base == Base::Root || target.starts_with('/');
    let bare = target.trim_start_matches('/').trim_start_matches("./");

    let (input, base_dir) = if from_root {
        (bare, source_root)
    } else {
        (target, referrer.parent().unwrap_or(source_root))
    };

    let primary = validate_reference(input, base_dir, source_root, policy)?;
    let mut out = vec![primary];

    let has_extension = Path::new(bare).extension().is_some();
    if !has_extension
        && let Ok(path) =
            validate_reference(&format!("{}.html", input), base_dir, source_root, policy)
    {
        out.push(path);
    }

    if !bare.contains(['/', '\\']) {
        let name = if has_extension {
            bare.to_string()
        } else {
            format!("{}.html", bare)
        };
        for dir in FRAGMENT_DIRS {
            if let Ok(path) = validate_path(&format!("{}/{}", dir, name), source_root, policy)
                && !out.contains(&path)
            {
                out.push(path);
            }
        }
    }
    Ok(out)
}

/// Resolves references against the in-memory file map.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    pub source_root: &'a Path,
    pub policy: &'a TraversalPolicy,
    pub files: &'a FileSystemMap,
}

impl<'a> Resolver<'a> {
    pub fn resolve(
        &self,
        target: &str,
        base: Base,
        referrer: &Path,
    ) -> Result<Resolved, SecurityError> {
        let candidates = candidates(target, base, referrer, self.source_root, self.policy)?;
        let primary = candidates[0].clone();
        let found = candidates
            .into_iter()
            .find_map(|path| self.lookup(&path).map(|content| (path, content)));
        Ok(Resolved { primary, found })
    }

    /// Content of `path`: from the file map for files inside the source
    /// root, from disk for allowlisted files outside it.
    fn lookup(&self, path: &Path) -> Option<Arc<str>> {
        if let Some(content) = self.files.get(path) {
            return Some(content);
        }
        if is_within(path, self.source_root) {
            return None;
        }
        std::fs::read_to_string(path).ok().map(Arc::from)
    }
}

/// Resolve against the filesystem: the first candidate that exists, or the
/// primary path when none does. Used for raw dependency scanning, where no
/// file map is available.
pub fn resolve_on_disk(
    target: &str,
    base: Base,
    referrer: &Path,
    source_root: &Path,
    policy: &TraversalPolicy,
) -> Result<PathBuf, SecurityError> {
    let candidates = candidates(target, base, referrer, source_root, policy)?;
    let existing = candidates.iter().find(|p| p.is_file()).cloned();
    Ok(existing.unwrap_or_else(|| candidates[0].clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/tmp/site/src")
    }

    fn cands(target: &str, base: Base, referrer: &str) -> Vec<PathBuf> {
        candidates(
            target,
            base,
            &root().join(referrer),
            &root(),
            &TraversalPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn relative_to_referrer() {
        let c = cands("_card.html", Base::Referrer, "blog/post.html");
        assert_eq!(c[0], root().join("blog/_card.html"));
        assert!(c.contains(&root().join("_components/_card.html")));
    }

    #[test]
    fn leading_slash_is_root_relative() {
        let c = cands("/_layouts/base.html", Base::Referrer, "blog/post.html");
        assert_eq!(c[0], root().join("_layouts/base.html"));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn virtual_base_is_root_relative() {
        let c = cands("_includes/nav.html", Base::Root, "deep/er/page.html");
        assert_eq!(c[0], root().join("_includes/nav.html"));
    }

    #[test]
    fn bare_name_gets_html_and_fragment_dirs() {
        let c = cands("base", Base::Referrer, "index.html");
        assert_eq!(c[0], root().join("base"));
        assert_eq!(c[1], root().join("base.html"));
        assert!(c.contains(&root().join("_layouts/base.html")));
        assert!(c.contains(&root().join("_includes/base.html")));
    }

    #[test]
    fn traversal_is_an_error() {
        let result = candidates(
            "../../../../etc/passwd",
            Base::Referrer,
            &root().join("index.html"),
            &root(),
            &TraversalPolicy::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn out_of_root_referrer_gets_no_marker_from_its_directory() {
        let result = candidates(
            "../../../x.html",
            Base::Referrer,
            Path::new("/tmp/site/_includes/a/b/c/header.html"),
            &root(),
            &TraversalPolicy::default(),
        );
        assert!(matches!(
            result,
            Err(SecurityError::TooManyTraversals { count: 3, .. })
        ));
    }

    #[test]
    fn resolver_prefers_existing_candidate() {
        let mut files = FileSystemMap::new(root());
        files.insert(root().join("_layouts/base.html"), "<html></html>");
        let resolver = Resolver {
            source_root: &root(),
            policy: &TraversalPolicy::default(),
            files: &files,
        };
        let resolved = resolver
            .resolve("base.html", Base::Referrer, &root().join("index.html"))
            .unwrap();
        assert_eq!(resolved.primary, root().join("base.html"));
        let (path, content) = resolved.found.unwrap();
        assert_eq!(path, root().join("_layouts/base.html"));
        assert_eq!(&*content, "<html></html>");
    }

    #[test]
    fn resolver_missing_inside_root() {
        let files = FileSystemMap::new(root());
        let resolver = Resolver {
            source_root: &root(),
            policy: &TraversalPolicy::default(),
            files: &files,
        };
        let resolved = resolver
            .resolve("missing.html", Base::Referrer, &root().join("index.html"))
            .unwrap();
        assert!(resolved.found.is_none());
        assert_eq!(resolved.primary, root().join("missing.html"));
    }
}
